//! Hand-rolled message definitions for the logical decoding plugin.
//!
//! Two incompatible revisions of the plugin's protobuf schema exist in the
//! wild. The [`local`] module matches the source vendor's fork, which keeps
//! a separate schema field and marks explicit nulls with a dedicated oneof
//! arm. The [`official`] module matches the upstream plugin, where the
//! table field may carry a dotted `schema.table` name and an unset oneof
//! means null.

/// Row operation carried by a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Op {
    Unknown = -1,
    Insert = 0,
    Update = 1,
    Delete = 2,
    Begin = 3,
    Commit = 4,
}

/// Geometric point payload.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Point {
    #[prost(double, required, tag = "1")]
    pub x: f64,
    #[prost(double, required, tag = "2")]
    pub y: f64,
}

/// Type metadata attached to new-tuple columns.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct TypeInfo {
    #[prost(int32, optional, tag = "1")]
    pub modifier: Option<i32>,
    #[prost(bool, optional, tag = "2")]
    pub value_optional: Option<bool>,
}

/// Vendor fork message layout.
pub mod local {
    use super::{Op, Point, TypeInfo};

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RowMessage {
        #[prost(uint32, optional, tag = "1")]
        pub transaction_id: Option<u32>,
        #[prost(uint64, optional, tag = "2")]
        pub commit_time: Option<u64>,
        #[prost(string, optional, tag = "3")]
        pub schema: Option<String>,
        #[prost(string, optional, tag = "4")]
        pub table: Option<String>,
        #[prost(enumeration = "Op", optional, tag = "5")]
        pub op: Option<i32>,
        #[prost(message, repeated, tag = "6")]
        pub new_tuple: Vec<DatumMessage>,
        #[prost(message, repeated, tag = "7")]
        pub old_tuple: Vec<DatumMessage>,
        #[prost(message, repeated, tag = "8")]
        pub new_typeinfo: Vec<TypeInfo>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DatumMessage {
        #[prost(string, optional, tag = "1")]
        pub column_name: Option<String>,
        #[prost(uint64, optional, tag = "2")]
        pub column_type: Option<u64>,
        #[prost(oneof = "Datum", tags = "3, 4, 5, 6, 7, 8, 9, 10, 11, 12")]
        pub datum: Option<Datum>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Datum {
        #[prost(int32, tag = "3")]
        DatumInt32(i32),
        #[prost(int64, tag = "4")]
        DatumInt64(i64),
        #[prost(float, tag = "5")]
        DatumFloat(f32),
        #[prost(double, tag = "6")]
        DatumDouble(f64),
        #[prost(bool, tag = "7")]
        DatumBool(bool),
        #[prost(string, tag = "8")]
        DatumString(String),
        #[prost(bytes, tag = "9")]
        DatumBytes(Vec<u8>),
        #[prost(message, tag = "10")]
        DatumPoint(Point),
        #[prost(bool, tag = "11")]
        DatumMissing(bool),
        // Vendor extension: explicit null marker.
        #[prost(bool, tag = "12")]
        DatumNull(bool),
    }
}

/// Upstream plugin message layout.
pub mod official {
    use super::{Op, Point, TypeInfo};

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RowMessage {
        #[prost(uint32, optional, tag = "1")]
        pub transaction_id: Option<u32>,
        #[prost(uint64, optional, tag = "2")]
        pub commit_time: Option<u64>,
        /// May carry a dotted `schema.table` name.
        #[prost(string, optional, tag = "3")]
        pub table: Option<String>,
        #[prost(enumeration = "Op", optional, tag = "4")]
        pub op: Option<i32>,
        #[prost(message, repeated, tag = "5")]
        pub new_tuple: Vec<DatumMessage>,
        #[prost(message, repeated, tag = "6")]
        pub old_tuple: Vec<DatumMessage>,
        #[prost(message, repeated, tag = "7")]
        pub new_typeinfo: Vec<TypeInfo>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DatumMessage {
        #[prost(string, optional, tag = "1")]
        pub column_name: Option<String>,
        #[prost(uint64, optional, tag = "2")]
        pub column_type: Option<u64>,
        /// An unset oneof means the column is null.
        #[prost(oneof = "Datum", tags = "3, 4, 5, 6, 7, 8, 9, 10, 11")]
        pub datum: Option<Datum>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Datum {
        #[prost(int32, tag = "3")]
        DatumInt32(i32),
        #[prost(int64, tag = "4")]
        DatumInt64(i64),
        #[prost(float, tag = "5")]
        DatumFloat(f32),
        #[prost(double, tag = "6")]
        DatumDouble(f64),
        #[prost(bool, tag = "7")]
        DatumBool(bool),
        #[prost(string, tag = "8")]
        DatumString(String),
        #[prost(bytes, tag = "9")]
        DatumBytes(Vec<u8>),
        #[prost(message, tag = "10")]
        DatumPoint(Point),
        #[prost(bool, tag = "11")]
        DatumMissing(bool),
    }
}
