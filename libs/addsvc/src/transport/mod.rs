pub mod errors;
pub mod rpc;

pub use self::errors::{decode_status, encode_error};
pub use self::rpc::{make_rpc_client, make_rpc_server};
