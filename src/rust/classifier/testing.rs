//! Tiny ONNX backbones for tests, encoded directly as protobuf.

use std::path::{Path, PathBuf};

fn varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn int_field(buf: &mut Vec<u8>, field: u64, value: u64) {
    varint(buf, field << 3);
    varint(buf, value);
}

fn bytes_field(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    varint(buf, (field << 3) | 2);
    varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// `ValueInfoProto` for a float tensor; `None` dims are symbolic batch dims.
fn float_tensor(name: &str, dims: &[Option<u64>]) -> Vec<u8> {
    let mut shape = Vec::new();
    for dim in dims {
        let mut d = Vec::new();
        match dim {
            Some(value) => int_field(&mut d, 1, *value),
            None => bytes_field(&mut d, 2, b"batch"),
        }
        bytes_field(&mut shape, 1, &d);
    }
    let mut tensor = Vec::new();
    int_field(&mut tensor, 1, 1); // FLOAT
    bytes_field(&mut tensor, 2, &shape);
    let mut ty = Vec::new();
    bytes_field(&mut ty, 1, &tensor);

    let mut info = Vec::new();
    bytes_field(&mut info, 1, name.as_bytes());
    bytes_field(&mut info, 2, &ty);
    info
}

/// A backbone reading `pixel_values` `[batch, 3, 224, 224]` and reducing it
/// with `op` (`ReduceMean`, `ReduceMax`, ...) into `pooler_output`.
///
/// With `axes = Some(&[2, 3])` the output is `[batch, 3]`; with `None` every
/// axis is reduced and the output is a scalar.
pub(crate) fn pooling_backbone(op: &str, axes: Option<&[u64]>) -> Vec<u8> {
    let mut node = Vec::new();
    bytes_field(&mut node, 1, b"pixel_values");
    bytes_field(&mut node, 2, b"pooler_output");
    bytes_field(&mut node, 4, op.as_bytes());
    if let Some(axes) = axes {
        let mut attr = Vec::new();
        bytes_field(&mut attr, 1, b"axes");
        for axis in axes {
            int_field(&mut attr, 8, *axis);
        }
        int_field(&mut attr, 20, 7); // INTS
        bytes_field(&mut node, 5, &attr);
    }
    let mut keepdims = Vec::new();
    bytes_field(&mut keepdims, 1, b"keepdims");
    int_field(&mut keepdims, 3, 0);
    int_field(&mut keepdims, 20, 2); // INT
    bytes_field(&mut node, 5, &keepdims);

    let output_dims: &[Option<u64>] = if axes.is_some() { &[None, Some(3)] } else { &[] };
    let mut graph = Vec::new();
    bytes_field(&mut graph, 1, &node);
    bytes_field(&mut graph, 2, b"backbone");
    bytes_field(&mut graph, 11, &float_tensor("pixel_values", &[None, Some(3), Some(224), Some(224)]));
    bytes_field(&mut graph, 12, &float_tensor("pooler_output", output_dims));

    let mut opset = Vec::new();
    bytes_field(&mut opset, 1, b"");
    int_field(&mut opset, 2, 13);

    let mut model = Vec::new();
    int_field(&mut model, 1, 8);
    bytes_field(&mut model, 2, b"morphview-tests");
    bytes_field(&mut model, 7, &graph);
    bytes_field(&mut model, 8, &opset);
    model
}

/// Writes a per-channel pooling backbone to `dir/name`.
pub(crate) fn write_backbone(dir: &Path, name: &str, op: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, pooling_backbone(op, Some(&[2, 3]))).unwrap();
    path
}

/// `config.json` of a checkpoint saved as `architecture` with `labels`
/// pretrained classes and 3-wide pooled features.
pub(crate) fn hub_config(architecture: &str, labels: usize) -> String {
    let id2label: serde_json::Map<String, serde_json::Value> = (0..labels)
        .map(|i| (i.to_string(), serde_json::Value::String(format!("class_{}", i))))
        .collect();
    serde_json::json!({
        "architectures": [architecture],
        "id2label": id2label,
        "hidden_size": 3,
        "hidden_sizes": [3],
    })
    .to_string()
}
