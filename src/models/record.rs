use std::collections::{HashMap, HashSet};

/// Field name -> raw field bytes.
pub type Record = HashMap<String, Vec<u8>>;

/// Copies the requested fields of `source` into `target`.
///
/// `None` means every field. Requested fields the record does not carry are
/// skipped.
pub fn copy_fields(source: &Record, fields: Option<&HashSet<String>>, target: &mut Record) {
    match fields {
        None => target.extend(source.iter().map(|(k, v)| (k.clone(), v.clone()))),
        Some(fields) => {
            for name in fields {
                if let Some(value) = source.get(name) {
                    target.insert(name.clone(), value.clone());
                }
            }
        }
    }
}

/// Overwrites `base` with every field of `values`, keeping the rest.
pub fn merge_fields(base: &mut Record, values: &Record) {
    for (name, value) in values {
        base.insert(name.clone(), value.clone());
    }
}
