use std::path::Path;

use anyhow::Context;

const DEVICE_FILE: &str = "device_id";

/// Label stamped on records pushed from this device.
///
/// An explicit label wins. Otherwise a label is generated once and kept in
/// the data directory so it stays stable across restarts.
pub fn resolve_label(explicit: Option<&str>, data_dir: &Path) -> anyhow::Result<String> {
    if let Some(label) = explicit {
        return Ok(label.to_string());
    }

    let path = data_dir.join(DEVICE_FILE);
    match std::fs::read_to_string(&path) {
        Ok(stored) if !stored.trim().is_empty() => return Ok(stored.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("reading {}", path.display()));
        }
    }

    let label = format!("device-{}", uuid::Uuid::new_v4().simple());
    std::fs::write(&path, &label).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(device = %label, "generated device label");
    Ok(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_label_is_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve_label(Some("front-desk"), dir.path()).unwrap(), "front-desk");
        assert!(!dir.path().join(DEVICE_FILE).exists());
    }

    #[test]
    fn generated_label_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let first = resolve_label(None, dir.path()).unwrap();
        let second = resolve_label(None, dir.path()).unwrap();

        assert!(first.starts_with("device-"));
        assert_eq!(first, second);
    }
}
