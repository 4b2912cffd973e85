//! Mesh import and export for GLB, glTF, OBJ, PLY, STL, and OFF.

use std::fmt;
use std::io::{BufRead, BufReader, Cursor, Write};
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::log_mesh_stats;
use crate::{Mesh, Vertex, VertexColor, gltf};

/// Mesh file formats accepted for export and import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ExportFormat {
    #[default]
    Glb,
    Gltf,
    Obj,
    Ply,
    Stl,
    Off,
}

impl ExportFormat {
    /// All formats in display order.
    pub const ALL: [ExportFormat; 6] = [
        ExportFormat::Glb,
        ExportFormat::Gltf,
        ExportFormat::Obj,
        ExportFormat::Ply,
        ExportFormat::Stl,
        ExportFormat::Off,
    ];

    /// Lowercase file extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Glb => "glb",
            ExportFormat::Gltf => "gltf",
            ExportFormat::Obj => "obj",
            ExportFormat::Ply => "ply",
            ExportFormat::Stl => "stl",
            ExportFormat::Off => "off",
        }
    }

    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for ExportFormat {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.extension() == normalized)
            .ok_or_else(|| MeshError::unsupported_format(s))
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Precision used for PLY vertex coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyPrecision {
    Float,
    Double,
}

/// Load a mesh from file, detecting the format from the extension.
///
/// The loaded mesh must have at least one face and valid indices.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let format = ExportFormat::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
        format: path.extension().and_then(|e| e.to_str()).map(String::from),
    })?;

    info!("Loading mesh from {:?} (format: {})", path, format);
    let bytes = std::fs::read(path).map_err(|e| MeshError::io_read(path, e))?;
    let mesh = decode_mesh(&bytes, format, path)?;

    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(MeshError::empty_mesh("mesh has no vertices or faces"));
    }
    mesh.check_indices()?;

    info!(
        "Loaded mesh: {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );
    log_mesh_stats(&mesh, "loaded");
    Ok(mesh)
}

/// Decode mesh bytes in the given format. `origin` is used in error messages.
pub fn decode_mesh(bytes: &[u8], format: ExportFormat, origin: &Path) -> MeshResult<Mesh> {
    match format {
        ExportFormat::Glb => gltf::decode_glb(bytes, origin),
        ExportFormat::Gltf => gltf::decode_gltf(bytes, origin),
        ExportFormat::Obj => read_obj(&mut BufReader::new(bytes), origin),
        ExportFormat::Ply => read_ply(&mut BufReader::new(bytes), origin),
        ExportFormat::Stl => read_stl(bytes, origin),
        ExportFormat::Off => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| MeshError::parse_error(origin, format!("OFF is not UTF-8: {}", e)))?;
            read_off(text, origin)
        }
    }
}

/// Encode a mesh into the bytes of the given format.
pub fn encode_mesh(mesh: &Mesh, format: ExportFormat) -> MeshResult<Vec<u8>> {
    mesh.check_indices()?;
    let label = format!("mesh.{}", format.extension());
    let mut out = Vec::new();
    match format {
        ExportFormat::Glb => return gltf::encode_glb(mesh),
        ExportFormat::Gltf => return gltf::encode_gltf(mesh),
        ExportFormat::Obj => write_obj(mesh, &mut out).map_err(|e| MeshError::io_write(&label, e))?,
        ExportFormat::Ply => write_ply(
            mesh,
            &mut out,
            ply_rs::ply::Encoding::BinaryLittleEndian,
            PlyPrecision::Float,
        )
        .map_err(|e| MeshError::io_write(&label, e))?,
        ExportFormat::Stl => write_stl(mesh, &mut out).map_err(|e| MeshError::io_write(&label, e))?,
        ExportFormat::Off => write_off(mesh, &mut out).map_err(|e| MeshError::io_write(&label, e))?,
    }
    Ok(out)
}

/// Save a mesh to file, detecting the format from the extension.
pub fn save_mesh(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let format = ExportFormat::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
        format: path.extension().and_then(|e| e.to_str()).map(String::from),
    })?;
    save_mesh_as(mesh, path, format)
}

/// Save a mesh to file in an explicit format, regardless of extension.
pub fn save_mesh_as(mesh: &Mesh, path: &Path, format: ExportFormat) -> MeshResult<()> {
    info!("Saving mesh to {:?} ({})", path, format);
    if mesh.is_empty() {
        warn!("Saving a mesh without faces to {:?}", path);
    }
    let bytes = encode_mesh(mesh, format)?;
    std::fs::write(path, &bytes).map_err(|e| MeshError::io_write(path, e))?;
    info!(
        "Saved {} vertices and {} faces to {:?} ({} bytes)",
        mesh.vertex_count(),
        mesh.face_count(),
        path,
        bytes.len()
    );
    Ok(())
}

fn read_stl(bytes: &[u8], origin: &Path) -> MeshResult<Mesh> {
    let mut cursor = Cursor::new(bytes);
    let stl = stl_io::read_stl(&mut cursor)
        .map_err(|e| MeshError::parse_error(origin, e.to_string()))?;

    debug!(
        "STL contains {} vertices, {} triangles",
        stl.vertices.len(),
        stl.faces.len()
    );

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    for v in &stl.vertices {
        mesh.vertices
            .push(Vertex::from_coords(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64));
    }
    for face in &stl.faces {
        let indices = face.vertices.map(|i| i as u32);
        // STL soups can carry collapsed triangles; drop them on import.
        if indices[0] != indices[1] && indices[1] != indices[2] && indices[0] != indices[2] {
            mesh.faces.push(indices);
        }
    }
    Ok(mesh)
}

fn write_stl<W: Write>(mesh: &Mesh, writer: &mut W) -> std::io::Result<()> {
    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|tri| {
            let n = tri.normal().unwrap_or_else(nalgebra::Vector3::zeros);
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [tri.v0, tri.v1, tri.v2]
                    .map(|p| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32])),
            }
        })
        .collect();
    stl_io::write_stl(writer, triangles.iter())
}

fn read_obj<R: BufRead>(reader: &mut R, origin: &Path) -> MeshResult<Mesh> {
    let (models, _materials) = tobj::load_obj_buf(
        reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Err(tobj::LoadError::OpenFileFailed),
    )
    .map_err(|e| MeshError::parse_error(origin, e.to_string()))?;

    let mut mesh = Mesh::new();
    for model in &models {
        let offset = mesh.vertices.len() as u32;
        let obj_mesh = &model.mesh;

        for (i, p) in obj_mesh.positions.chunks_exact(3).enumerate() {
            let mut vertex = Vertex::from_coords(p[0] as f64, p[1] as f64, p[2] as f64);
            if let Some(n) = obj_mesh.normals.get(i * 3..i * 3 + 3) {
                vertex.normal = Some(nalgebra::Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64));
            }
            if let Some(c) = obj_mesh.vertex_color.get(i * 3..i * 3 + 3) {
                vertex.color = Some(VertexColor::from_unit_rgb(c[0], c[1], c[2]));
            }
            mesh.vertices.push(vertex);
        }
        for tri in obj_mesh.indices.chunks_exact(3) {
            mesh.faces.push([tri[0] + offset, tri[1] + offset, tri[2] + offset]);
        }
    }

    debug!(
        "OBJ loaded: {} vertices, {} faces from {} models",
        mesh.vertices.len(),
        mesh.faces.len(),
        models.len()
    );
    Ok(mesh)
}

fn write_obj<W: Write>(mesh: &Mesh, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "# shapegen mesh")?;
    writeln!(writer, "# Vertices: {}", mesh.vertices.len())?;
    writeln!(writer, "# Faces: {}", mesh.faces.len())?;

    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());
    for v in &mesh.vertices {
        match v.color {
            Some(c) => writeln!(
                writer,
                "v {:.6} {:.6} {:.6} {:.4} {:.4} {:.4}",
                v.position.x,
                v.position.y,
                v.position.z,
                c.r as f32 / 255.0,
                c.g as f32 / 255.0,
                c.b as f32 / 255.0
            )?,
            None => writeln!(
                writer,
                "v {:.6} {:.6} {:.6}",
                v.position.x, v.position.y, v.position.z
            )?,
        }
    }
    if has_normals {
        for v in &mesh.vertices {
            // Zero placeholders keep normal indices aligned with vertices.
            let n = v.normal.unwrap_or_else(nalgebra::Vector3::zeros);
            writeln!(writer, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
        }
    }
    for face in &mesh.faces {
        let [a, b, c] = face.map(|i| i + 1);
        if has_normals {
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
        } else {
            writeln!(writer, "f {a} {b} {c}")?;
        }
    }
    writer.flush()
}

fn read_ply<R: BufRead>(reader: &mut R, origin: &Path) -> MeshResult<Mesh> {
    use ply_rs::parser::Parser;
    use ply_rs::ply::{DefaultElement, Property};

    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(reader)
        .map_err(|e| MeshError::parse_error(origin, format!("PLY parse error: {:?}", e)))?;

    let mut mesh = Mesh::new();
    if let Some(vertices) = ply.payload.get("vertex") {
        mesh.vertices.reserve(vertices.len());
        for element in vertices {
            let x = ply_float(element.get("x"), "x", origin)?;
            let y = ply_float(element.get("y"), "y", origin)?;
            let z = ply_float(element.get("z"), "z", origin)?;
            let mut vertex = Vertex::from_coords(x, y, z);

            if let (Ok(nx), Ok(ny), Ok(nz)) = (
                ply_float(element.get("nx"), "nx", origin),
                ply_float(element.get("ny"), "ny", origin),
                ply_float(element.get("nz"), "nz", origin),
            ) {
                vertex.normal = Some(nalgebra::Vector3::new(nx, ny, nz));
            }
            if let (Some(r), Some(g), Some(b)) = (
                ply_u8(element.get("red")),
                ply_u8(element.get("green")),
                ply_u8(element.get("blue")),
            ) {
                vertex.color = Some(VertexColor::new(r, g, b));
            }
            mesh.vertices.push(vertex);
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        mesh.faces.reserve(faces.len());
        for element in faces {
            let indices: Vec<u32> = match element
                .get("vertex_indices")
                .or_else(|| element.get("vertex_index"))
            {
                Some(Property::ListInt(v)) => v.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUInt(v)) => v.clone(),
                Some(Property::ListUChar(v)) => v.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUShort(v)) => v.iter().map(|&i| i as u32).collect(),
                Some(Property::ListShort(v)) => v.iter().map(|&i| i as u32).collect(),
                _ => continue,
            };
            for i in 1..indices.len().saturating_sub(1) {
                mesh.faces.push([indices[0], indices[i], indices[i + 1]]);
            }
        }
    }

    debug!(
        "PLY loaded: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(mesh)
}

fn ply_float(prop: Option<&ply_rs::ply::Property>, name: &str, origin: &Path) -> MeshResult<f64> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        _ => Err(MeshError::parse_error(
            origin,
            format!("missing or invalid PLY property: {}", name),
        )),
    }
}

fn ply_u8(prop: Option<&ply_rs::ply::Property>) -> Option<u8> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::UChar(v)) => Some(*v),
        Some(Property::Char(v)) => Some(*v as u8),
        Some(Property::UShort(v)) => Some((*v).min(255) as u8),
        Some(Property::Short(v)) => Some((*v).clamp(0, 255) as u8),
        Some(Property::UInt(v)) => Some((*v).min(255) as u8),
        Some(Property::Int(v)) => Some((*v).clamp(0, 255) as u8),
        Some(Property::Float(v)) => Some((v * 255.0).clamp(0.0, 255.0) as u8),
        Some(Property::Double(v)) => Some((v * 255.0).clamp(0.0, 255.0) as u8),
        _ => None,
    }
}

/// Write a mesh as PLY with the given encoding and coordinate precision.
pub fn write_ply<W: Write>(
    mesh: &Mesh,
    writer: &mut W,
    encoding: ply_rs::ply::Encoding,
    precision: PlyPrecision,
) -> std::io::Result<()> {
    use ply_rs::ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    };
    use ply_rs::writer::Writer;

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = encoding;

    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());
    let has_colors = mesh.vertices.iter().any(|v| v.color.is_some());

    let scalar = match precision {
        PlyPrecision::Float => ScalarType::Float,
        PlyPrecision::Double => ScalarType::Double,
    };
    let to_property = |v: f64| match precision {
        PlyPrecision::Float => Property::Float(v as f32),
        PlyPrecision::Double => Property::Double(v),
    };

    let mut vertex_def = ElementDef::new("vertex".to_string());
    let mut scalar_names = vec!["x", "y", "z"];
    if has_normals {
        scalar_names.extend(["nx", "ny", "nz"]);
    }
    for name in &scalar_names {
        vertex_def
            .properties
            .add(PropertyDef::new(name.to_string(), PropertyType::Scalar(scalar.clone())));
    }
    if has_colors {
        for name in ["red", "green", "blue"] {
            vertex_def.properties.add(PropertyDef::new(
                name.to_string(),
                PropertyType::Scalar(ScalarType::UChar),
            ));
        }
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = mesh.faces.len();
    ply.header.elements.add(face_def);

    let vertices_payload: Vec<DefaultElement> = mesh
        .vertices
        .iter()
        .map(|v| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), to_property(v.position.x));
            element.insert("y".to_string(), to_property(v.position.y));
            element.insert("z".to_string(), to_property(v.position.z));
            if has_normals {
                let n = v.normal.unwrap_or_else(nalgebra::Vector3::zeros);
                element.insert("nx".to_string(), to_property(n.x));
                element.insert("ny".to_string(), to_property(n.y));
                element.insert("nz".to_string(), to_property(n.z));
            }
            if has_colors {
                let c = v.color.unwrap_or(VertexColor::new(255, 255, 255));
                element.insert("red".to_string(), Property::UChar(c.r));
                element.insert("green".to_string(), Property::UChar(c.g));
                element.insert("blue".to_string(), Property::UChar(c.b));
            }
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices_payload);

    let faces_payload: Vec<DefaultElement> = mesh
        .faces
        .iter()
        .map(|face| {
            let mut element = DefaultElement::new();
            element.insert(
                "vertex_indices".to_string(),
                Property::ListInt(face.iter().map(|&i| i as i32).collect()),
            );
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces_payload);

    ply.make_consistent().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("PLY consistency error: {:?}", e),
        )
    })?;

    let ply_writer = Writer::new();
    ply_writer.write_header(writer, &ply.header)?;
    for name in ["vertex", "face"] {
        let (Some(def), Some(elements)) = (ply.header.elements.get(name), ply.payload.get(name))
        else {
            continue;
        };
        if name == "face" && encoding != Encoding::Ascii {
            write_binary_faces(mesh, writer, encoding)?;
        } else {
            ply_writer.write_payload_of_element(writer, elements, def, &ply.header)?;
        }
    }
    writer.flush()
}

/// Binary face records: a `uchar` count followed by three `int` indices.
///
/// ply-rs 0.1 prefixes binary lists with the element count, not the list length.
fn write_binary_faces<W: Write>(
    mesh: &Mesh,
    writer: &mut W,
    encoding: ply_rs::ply::Encoding,
) -> std::io::Result<()> {
    let big_endian = encoding == ply_rs::ply::Encoding::BinaryBigEndian;
    let mut record = [0u8; 13];
    record[0] = 3;
    for face in &mesh.faces {
        for (slot, &index) in face.iter().enumerate() {
            let bytes = if big_endian {
                (index as i32).to_be_bytes()
            } else {
                (index as i32).to_le_bytes()
            };
            record[1 + slot * 4..5 + slot * 4].copy_from_slice(&bytes);
        }
        writer.write_all(&record)?;
    }
    Ok(())
}

fn next_token<'a, T: FromStr>(
    tokens: &mut impl Iterator<Item = &'a str>,
    what: &str,
    origin: &Path,
) -> MeshResult<T> {
    tokens
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| MeshError::parse_error(origin, format!("OFF: expected {}", what)))
}

/// Parse an Object File Format document. Polygons are fan-triangulated.
fn read_off(text: &str, origin: &Path) -> MeshResult<Mesh> {
    let mut tokens = text
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(str::split_whitespace);

    match tokens.next() {
        Some("OFF") => {}
        Some(other) if other.ends_with("OFF") => {
            return Err(MeshError::parse_error(
                origin,
                format!("OFF: unsupported variant {}", other),
            ));
        }
        _ => return Err(MeshError::parse_error(origin, "OFF: missing header")),
    }

    let vertex_count: usize = next_token(&mut tokens, "vertex count", origin)?;
    let face_count: usize = next_token(&mut tokens, "face count", origin)?;
    let _edge_count: usize = next_token(&mut tokens, "edge count", origin)?;

    let mut mesh = Mesh::with_capacity(vertex_count, face_count);
    for _ in 0..vertex_count {
        let x = next_token(&mut tokens, "x", origin)?;
        let y = next_token(&mut tokens, "y", origin)?;
        let z = next_token(&mut tokens, "z", origin)?;
        mesh.vertices.push(Vertex::from_coords(x, y, z));
    }

    for _ in 0..face_count {
        let n: usize = next_token(&mut tokens, "polygon size", origin)?;
        let polygon = (0..n)
            .map(|_| next_token::<u32>(&mut tokens, "vertex index", origin))
            .collect::<MeshResult<Vec<_>>>()?;
        for i in 1..n.saturating_sub(1) {
            mesh.faces.push([polygon[0], polygon[i], polygon[i + 1]]);
        }
    }

    Ok(mesh)
}

fn write_off<W: Write>(mesh: &Mesh, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "OFF")?;
    writeln!(writer, "{} {} 0", mesh.vertices.len(), mesh.faces.len())?;
    for v in &mesh.vertices {
        writeln!(writer, "{} {} {}", v.position.x, v.position.y, v.position.z)?;
    }
    for [a, b, c] in &mesh.faces {
        writeln!(writer, "3 {a} {b} {c}")?;
    }
    writer.flush()
}
