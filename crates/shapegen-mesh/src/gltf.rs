//! Minimal glTF 2.0 encoder and decoder for triangle meshes.
//!
//! The encoder writes one mesh with a single triangle primitive: `POSITION`,
//! optional `NORMAL`, and `u32` indices. GLB output packs the JSON and binary
//! chunks; `.gltf` output embeds the buffer as a base64 data URI.
//!
//! The decoder accepts triangle primitives from any mesh in the document,
//! reading float or normalized-integer positions and unsigned integer indices.
//! Node transforms are not applied.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{MeshError, MeshResult};
use crate::{Mesh, Vertex};

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;

const COMPONENT_FLOAT: u64 = 5126;
const COMPONENT_UNSIGNED_INT: u64 = 5125;
const MODE_TRIANGLES: u64 = 4;

const DATA_URI_PREFIX: &str = "data:application/octet-stream;base64,";

fn pad_to_four(bytes: &mut Vec<u8>, fill: u8) {
    while bytes.len() % 4 != 0 {
        bytes.push(fill);
    }
}

/// Build the JSON document and binary buffer shared by both encodings.
fn build_document(mesh: &Mesh, buffer_uri: Option<String>) -> (Value, Vec<u8>) {
    let positions: Vec<f32> = mesh
        .vertices
        .iter()
        .flat_map(|v| [v.position.x as f32, v.position.y as f32, v.position.z as f32])
        .collect();
    let has_normals = !mesh.vertices.is_empty() && mesh.vertices.iter().all(|v| v.normal.is_some());
    let normals: Vec<f32> = if has_normals {
        mesh.vertices
            .iter()
            .flat_map(|v| {
                let n = v.normal.unwrap_or_else(nalgebra::Vector3::zeros);
                [n.x as f32, n.y as f32, n.z as f32]
            })
            .collect()
    } else {
        Vec::new()
    };
    let indices: Vec<u32> = mesh.faces.iter().flatten().copied().collect();

    let (min, max) = mesh.bounds().unwrap_or_default();

    let mut bin: Vec<u8> = Vec::new();
    let mut views = Vec::new();
    let mut accessors = Vec::new();
    let mut attributes = serde_json::Map::new();

    let position_offset = bin.len();
    bin.extend_from_slice(bytemuck::cast_slice(&positions));
    views.push(json!({
        "buffer": 0,
        "byteOffset": position_offset,
        "byteLength": positions.len() * 4,
        "target": ARRAY_BUFFER,
    }));
    accessors.push(json!({
        "bufferView": views.len() - 1,
        "componentType": COMPONENT_FLOAT,
        "count": mesh.vertices.len(),
        "type": "VEC3",
        "min": [min.x as f32, min.y as f32, min.z as f32],
        "max": [max.x as f32, max.y as f32, max.z as f32],
    }));
    attributes.insert("POSITION".to_string(), json!(accessors.len() - 1));

    if has_normals {
        let normal_offset = bin.len();
        bin.extend_from_slice(bytemuck::cast_slice(&normals));
        views.push(json!({
            "buffer": 0,
            "byteOffset": normal_offset,
            "byteLength": normals.len() * 4,
            "target": ARRAY_BUFFER,
        }));
        accessors.push(json!({
            "bufferView": views.len() - 1,
            "componentType": COMPONENT_FLOAT,
            "count": mesh.vertices.len(),
            "type": "VEC3",
        }));
        attributes.insert("NORMAL".to_string(), json!(accessors.len() - 1));
    }

    let index_offset = bin.len();
    bin.extend_from_slice(bytemuck::cast_slice(&indices));
    views.push(json!({
        "buffer": 0,
        "byteOffset": index_offset,
        "byteLength": indices.len() * 4,
        "target": ELEMENT_ARRAY_BUFFER,
    }));
    accessors.push(json!({
        "bufferView": views.len() - 1,
        "componentType": COMPONENT_UNSIGNED_INT,
        "count": indices.len(),
        "type": "SCALAR",
    }));
    let index_accessor = accessors.len() - 1;

    let mut buffer = json!({ "byteLength": bin.len() });
    if let Some(uri) = buffer_uri {
        buffer["uri"] = json!(uri);
    }

    let document = json!({
        "asset": { "version": "2.0", "generator": "shapegen" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": attributes,
                "indices": index_accessor,
                "mode": MODE_TRIANGLES,
            }]
        }],
        "buffers": [buffer],
        "bufferViews": views,
        "accessors": accessors,
    });

    (document, bin)
}

/// Encode a mesh as a binary GLB container.
pub fn encode_glb(mesh: &Mesh) -> MeshResult<Vec<u8>> {
    let (document, mut bin) = build_document(mesh, None);
    let mut json_bytes =
        serde_json::to_vec(&document).map_err(|e| MeshError::io_write("mesh.glb", e.into()))?;
    pad_to_four(&mut json_bytes, b' ');
    pad_to_four(&mut bin, 0);

    let total = 12 + 8 + json_bytes.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_bytes);

    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);

    debug!("Encoded GLB: {} bytes", out.len());
    Ok(out)
}

/// Encode a mesh as a self-contained `.gltf` JSON document.
pub fn encode_gltf(mesh: &Mesh) -> MeshResult<Vec<u8>> {
    let (_, bin) = build_document(mesh, None);
    let uri = format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(&bin));
    let (document, _) = build_document(mesh, Some(uri));
    serde_json::to_vec_pretty(&document).map_err(|e| MeshError::io_write("mesh.gltf", e.into()))
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Decode a binary GLB container.
pub fn decode_glb(bytes: &[u8], origin: &Path) -> MeshResult<Mesh> {
    let bad = |details: &str| MeshError::parse_error(origin, format!("GLB: {}", details));

    if read_u32(bytes, 0) != Some(GLB_MAGIC) {
        return Err(bad("missing glTF magic"));
    }
    if read_u32(bytes, 4) != Some(GLB_VERSION) {
        return Err(bad("only version 2 is supported"));
    }

    let mut offset = 12;
    let mut document: Option<Value> = None;
    let mut bin: Option<Vec<u8>> = None;

    while offset + 8 <= bytes.len() {
        let (Some(length), Some(kind)) = (read_u32(bytes, offset), read_u32(bytes, offset + 4))
        else {
            break;
        };
        let start = offset + 8;
        let end = start + length as usize;
        let chunk = bytes.get(start..end).ok_or_else(|| bad("truncated chunk"))?;
        match kind {
            CHUNK_JSON => {
                document = Some(
                    serde_json::from_slice(chunk)
                        .map_err(|e| bad(&format!("invalid JSON chunk: {}", e)))?,
                );
            }
            CHUNK_BIN => bin = Some(chunk.to_vec()),
            _ => {}
        }
        offset = end;
    }

    let document = document.ok_or_else(|| bad("missing JSON chunk"))?;
    let buffers = vec![bin.unwrap_or_default()];
    decode_document(&document, &buffers, origin)
}

/// Decode a `.gltf` JSON document whose buffers are base64 data URIs.
pub fn decode_gltf(bytes: &[u8], origin: &Path) -> MeshResult<Mesh> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| MeshError::parse_error(origin, format!("glTF: invalid JSON: {}", e)))?;

    let mut buffers = Vec::new();
    for buffer in document["buffers"].as_array().into_iter().flatten() {
        let uri = buffer["uri"].as_str().unwrap_or_default();
        let Some((_, payload)) = uri.split_once(";base64,") else {
            return Err(MeshError::parse_error(
                origin,
                "glTF: only embedded base64 buffers are supported",
            ));
        };
        let data = STANDARD
            .decode(payload)
            .map_err(|e| MeshError::parse_error(origin, format!("glTF: bad base64: {}", e)))?;
        buffers.push(data);
    }

    decode_document(&document, &buffers, origin)
}

fn component_size(component_type: u64) -> Option<usize> {
    match component_type {
        5120 | 5121 => Some(1),
        5122 | 5123 => Some(2),
        5125 | 5126 => Some(4),
        _ => None,
    }
}

fn type_width(kind: &str) -> Option<usize> {
    match kind {
        "SCALAR" => Some(1),
        "VEC2" => Some(2),
        "VEC3" => Some(3),
        "VEC4" => Some(4),
        _ => None,
    }
}

fn read_component(bytes: &[u8], component_type: u64, normalized: bool) -> f64 {
    let value = match component_type {
        5120 => bytes[0] as i8 as f64,
        5121 => bytes[0] as f64,
        5122 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        5123 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        5125 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        _ => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
    };
    if !normalized {
        return value;
    }
    match component_type {
        5120 => (value / 127.0).max(-1.0),
        5121 => value / 255.0,
        5122 => (value / 32767.0).max(-1.0),
        5123 => value / 65535.0,
        _ => value,
    }
}

/// Read an accessor as a flat list of components.
fn read_accessor(
    document: &Value,
    buffers: &[Vec<u8>],
    index: usize,
    origin: &Path,
) -> MeshResult<(Vec<f64>, usize)> {
    let bad = |details: String| MeshError::parse_error(origin, format!("glTF accessor {}: {}", index, details));

    let accessor = &document["accessors"][index];
    let component_type = accessor["componentType"].as_u64().unwrap_or(0);
    let size = component_size(component_type)
        .ok_or_else(|| bad(format!("unsupported component type {}", component_type)))?;
    let width = type_width(accessor["type"].as_str().unwrap_or_default())
        .ok_or_else(|| bad("unsupported element type".to_string()))?;
    let count = accessor["count"].as_u64().unwrap_or(0) as usize;
    let normalized = accessor["normalized"].as_bool().unwrap_or(false);

    let view_index = accessor["bufferView"]
        .as_u64()
        .ok_or_else(|| bad("sparse or view-less accessors are not supported".to_string()))?;
    let view = &document["bufferViews"][view_index as usize];
    let buffer_index = view["buffer"].as_u64().unwrap_or(0) as usize;
    let buffer = buffers
        .get(buffer_index)
        .ok_or_else(|| bad(format!("missing buffer {}", buffer_index)))?;

    let base = view["byteOffset"].as_u64().unwrap_or(0) as usize
        + accessor["byteOffset"].as_u64().unwrap_or(0) as usize;
    let stride = view["byteStride"]
        .as_u64()
        .map(|s| s as usize)
        .unwrap_or(size * width);

    let mut values = Vec::with_capacity(count * width);
    for element in 0..count {
        for component in 0..width {
            let at = base + element * stride + component * size;
            let raw = buffer
                .get(at..at + size)
                .ok_or_else(|| bad("data out of buffer bounds".to_string()))?;
            values.push(read_component(raw, component_type, normalized));
        }
    }
    Ok((values, width))
}

fn decode_document(document: &Value, buffers: &[Vec<u8>], origin: &Path) -> MeshResult<Mesh> {
    let mut mesh = Mesh::new();

    for gltf_mesh in document["meshes"].as_array().into_iter().flatten() {
        for primitive in gltf_mesh["primitives"].as_array().into_iter().flatten() {
            let mode = primitive["mode"].as_u64().unwrap_or(MODE_TRIANGLES);
            if mode != MODE_TRIANGLES {
                debug!("Skipping glTF primitive with mode {}", mode);
                continue;
            }
            let Some(position_index) = primitive["attributes"]["POSITION"].as_u64() else {
                continue;
            };

            let (positions, width) = read_accessor(document, buffers, position_index as usize, origin)?;
            if width != 3 {
                return Err(MeshError::parse_error(origin, "glTF: POSITION must be VEC3"));
            }
            let offset = mesh.vertices.len() as u32;
            let local_count = positions.len() / 3;
            for p in positions.chunks_exact(3) {
                mesh.vertices.push(Vertex::from_coords(p[0], p[1], p[2]));
            }

            let indices: Vec<u32> = match primitive["indices"].as_u64() {
                Some(index) => read_accessor(document, buffers, index as usize, origin)?
                    .0
                    .into_iter()
                    .map(|i| i as u32)
                    .collect(),
                None => (0..local_count as u32).collect(),
            };
            for tri in indices.chunks_exact(3) {
                mesh.faces.push([tri[0] + offset, tri[1] + offset, tri[2] + offset]);
            }
        }
    }

    debug!(
        "glTF decoded: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        Mesh::from_raw(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            &[[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_glb_header_and_alignment() {
        let bytes = encode_glb(&quad()).unwrap();
        assert_eq!(&bytes[0..4], b"glTF");
        assert_eq!(read_u32(&bytes, 8), Some(bytes.len() as u32));
        assert_eq!(bytes.len() % 4, 0);
        let json_len = read_u32(&bytes, 12).unwrap();
        assert_eq!(json_len % 4, 0);
    }

    #[test]
    fn test_glb_decodes_back() {
        let mesh = quad();
        let bytes = encode_glb(&mesh).unwrap();
        let decoded = decode_glb(&bytes, Path::new("quad.glb")).unwrap();
        assert_eq!(decoded.faces, mesh.faces);
        assert_eq!(decoded.vertices.len(), 4);
        assert_eq!(decoded.vertices[2].position, mesh.vertices[2].position);
    }

    #[test]
    fn test_gltf_embeds_data_uri() {
        let bytes = encode_gltf(&quad()).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        let uri = doc["buffers"][0]["uri"].as_str().unwrap();
        assert!(uri.starts_with(DATA_URI_PREFIX));

        let decoded = decode_gltf(&bytes, Path::new("quad.gltf")).unwrap();
        assert_eq!(decoded.face_count(), 2);
    }

    #[test]
    fn test_rejects_non_glb() {
        assert!(decode_glb(b"solid cube", Path::new("x.glb")).is_err());
    }
}
