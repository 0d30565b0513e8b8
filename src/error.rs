#[derive(Debug, thiserror::Error)]
pub enum SnapError {
    #[error("sysctl error: {0}")]
    Sysctl(#[source] std::io::Error),
    #[error("libproc error: {0}")]
    Libproc(String),
    #[error("interface enumeration error: {0}")]
    Interface(#[source] std::io::Error),
    #[error("procfs read error ({path}): {source}")]
    Procfs {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program}: {detail}")]
    Command { program: String, detail: String },
    #[error("route message decode error at offset {offset}: {detail}")]
    RouteDecode { offset: usize, detail: String },
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error("serialization error: {0}")]
    Serialization(#[source] std::io::Error),
    #[error("fatal: {0}")]
    Fatal(String),
}
