use core::error::Error;

/// Console proxy errors
#[derive(Debug, derive_more::Display)]
pub enum ProxyError {
    #[display("Failed to read socket directory {path}")]
    SocketDirUnreadable { path: String },
    #[display("Expected exactly one VM directory in {path}, found {count}")]
    AmbiguousSocketDir { path: String, count: usize },
    #[display("Server error: {message}")]
    ServerError { message: String },
}

impl Error for ProxyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_error_display_formatting() {
        let unreadable = ProxyError::SocketDirUnreadable {
            path: "/var/run/kubevirt-private".to_string(),
        };
        assert_eq!(
            unreadable.to_string(),
            "Failed to read socket directory /var/run/kubevirt-private"
        );

        let ambiguous = ProxyError::AmbiguousSocketDir {
            path: "/sockets".to_string(),
            count: 2,
        };
        assert_eq!(
            ambiguous.to_string(),
            "Expected exactly one VM directory in /sockets, found 2"
        );

        let server = ProxyError::ServerError {
            message: "address in use".to_string(),
        };
        assert_eq!(server.to_string(), "Server error: address in use");
    }
}
