use serde_json::Value;

pub const POD_TEMPLATE_HASH_LABEL: &str = "pod-template-hash";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

// Same alphabet as the Kubernetes name generator: no vowels, no 0/1/3.
const SAFE_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

struct Fnv32a(u32);

impl Fnv32a {
    fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= u32::from(*b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }
}

fn safe_encode(s: &str) -> String {
    s.bytes()
        .map(|b| SAFE_ALPHABET[b as usize % SAFE_ALPHABET.len()] as char)
        .collect()
}

/// Strips the `pod-template-hash` label, dropping the labels map when that
/// leaves it empty.
fn without_hash_label(template: &Value) -> Value {
    let mut template = template.clone();
    if let Some(metadata) = template.get_mut("metadata").and_then(Value::as_object_mut) {
        if let Some(labels) = metadata.get_mut("labels").and_then(Value::as_object_mut) {
            labels.remove(POD_TEMPLATE_HASH_LABEL);
            if labels.is_empty() {
                metadata.remove("labels");
            }
        }
    }
    template
}

/// Hash identifying a pod template revision. Deployments and their replica
/// sets hash to the same value when the templates only differ by the
/// `pod-template-hash` label.
pub fn pod_template_hash(template: &Value, collision_count: Option<i64>) -> String {
    let mut hasher = Fnv32a::new();
    // object keys serialize sorted, so the bytes don't depend on field order
    let canonical = serde_json::to_vec(&without_hash_label(template)).unwrap_or_default();
    hasher.write(&canonical);
    if let Some(count) = collision_count {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&(count as u32).to_le_bytes());
        hasher.write(&bytes);
    }
    safe_encode(&hasher.0.to_string())
}
