use std::io::Write;

use crate::error::SnapError;
use crate::state::Snapshot;

/// Write the snapshot as pretty JSON followed by a newline.
pub fn write_json(snapshot: &Snapshot, writer: &mut impl Write) -> Result<(), SnapError> {
    serde_json::to_writer_pretty(&mut *writer, snapshot)
        .map_err(|e| SnapError::Serialization(std::io::Error::other(e.to_string())))?;
    writeln!(writer).map_err(SnapError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::state::Store;

    fn to_value(snapshot: &Snapshot) -> serde_json::Value {
        let mut buf = Vec::new();
        write_json(snapshot, &mut buf).unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    #[test]
    fn empty_snapshot() {
        let v = to_value(&Store::new().snapshot());
        assert_eq!(v["seq"], 0);
        assert!(v["sockets"].as_array().unwrap().is_empty());
        assert!(v.get("indices").is_none());
    }

    #[test]
    fn fields_and_tags() {
        let store = Store::new();
        store.update(CollectionResult {
            sockets: vec![Socket {
                proto: SocketProto::Udp6,
                local_addr: "::".into(),
                local_port: 5353,
                remote_addr: "::".into(),
                remote_port: 0,
                state: SocketState::Bound,
                pid: None,
                process: String::new(),
            }],
            errors: vec![CollectionError::new(Source::LsofUnix, "lsof -U: exit status: 1")],
            is_root: true,
            timestamp: 42,
            ..Default::default()
        });
        let v = to_value(&store.snapshot());

        let s = &v["sockets"][0];
        assert_eq!(s["proto"], "udp6");
        assert_eq!(s["state"], "BOUND");
        assert!(s["pid"].is_null());
        assert_eq!(v["errors"][0]["source"], "lsof-unix");
        assert_eq!(v["is_root"], true);
        assert_eq!(v["timestamp"], 42);
    }
}
