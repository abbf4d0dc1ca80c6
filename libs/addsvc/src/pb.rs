//! Wire messages of the `addsvc.Add` service.

use serde::{Deserialize, Serialize};

pub const METHOD_SUM: &str = "addsvc.Add/Sum";
pub const METHOD_CONCAT: &str = "addsvc.Add/Concat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumRequest {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumReply {
    pub res: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatRequest {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatReply {
    pub res: String,
}
