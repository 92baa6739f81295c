mod convert;
pub use convert::{from_sqs, region_from_url};

mod transport;
pub use transport::SqsTransport;
