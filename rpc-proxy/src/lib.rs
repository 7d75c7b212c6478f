pub mod error;
pub mod framing;
pub mod http;
pub mod settings;
pub mod tcp;
pub mod upstream;

pub use error::ProxyError;
pub use http::HttpProxy;
pub use settings::ProxySettings;
pub use tcp::TcpProxy;
pub use upstream::Upstream;
