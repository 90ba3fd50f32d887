//! Message shapes of the PB stream.
//!
//! | Code | Type              | Message          | Column element |
//! | ---: | ----------------- | ---------------- | -------------- |
//! | 0    | `ScalarString`    | `ScalarString`   | `String`       |
//! | 1    | `ScalarShort`     | `ScalarShort`    | `i16`          |
//! | 2    | `ScalarFloat`     | `ScalarFloat`    | `f32`          |
//! | 3    | `ScalarEnum`      | `ScalarEnum`     | `i16`          |
//! | 4    | `ScalarByte`      | `ScalarByte`     | `i8`           |
//! | 5    | `ScalarInt`       | `ScalarInt`      | `i32`          |
//! | 6    | `ScalarDouble`    | `ScalarDouble`   | `f64`          |
//! | 7    | `WaveformString`  | `VectorString`   | `Vec<String>`  |
//! | 8    | `WaveformShort`   | `VectorShort`    | `Vec<i16>`     |
//! | 9    | `WaveformFloat`   | `VectorFloat`    | `Vec<f32>`     |
//! | 10   | `WaveformEnum`    | `VectorEnum`     | `Vec<i16>`     |
//! | 11   | `WaveformByte`    | `VectorChar`     | `Vec<i8>`      |
//! | 12   | `WaveformInt`     | `VectorInt`      | `Vec<i32>`     |
//! | 13   | `WaveformDouble`  | `VectorDouble`   | `Vec<f64>`     |
//! | 14   | `V4GenericBytes`  | `V4GenericBytes` | `Vec<u8>`      |
use prost::Message;

use crate::decode::Values;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PayloadType {
    ScalarString = 0,
    ScalarShort = 1,
    ScalarFloat = 2,
    ScalarEnum = 3,
    ScalarByte = 4,
    ScalarInt = 5,
    ScalarDouble = 6,
    WaveformString = 7,
    WaveformShort = 8,
    WaveformFloat = 9,
    WaveformEnum = 10,
    WaveformByte = 11,
    WaveformInt = 12,
    WaveformDouble = 13,
    V4GenericBytes = 14,
}

impl PayloadType {
    pub fn is_vector(self) -> bool {
        self >= PayloadType::WaveformString
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct FieldValue {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(string, required, tag = "2")]
    pub val: String,
}

/// Stream header
#[derive(Clone, PartialEq, Message)]
pub struct PayloadInfo {
    #[prost(enumeration = "PayloadType", required, tag = "1")]
    pub r#type: i32,
    #[prost(string, required, tag = "2")]
    pub pvname: String,
    #[prost(int32, required, tag = "3")]
    pub year: i32,
    #[prost(uint32, optional, tag = "4")]
    pub element_count: Option<u32>,
    #[prost(message, repeated, tag = "15")]
    pub headers: Vec<FieldValue>,
}

impl PayloadInfo {
    pub fn new(typ: PayloadType, pvname: impl Into<String>, year: i32) -> Self {
        PayloadInfo {
            r#type: typ as i32,
            pvname: pvname.into(),
            year,
            element_count: None,
            headers: vec![],
        }
    }

    pub fn payload_type(&self) -> Result<PayloadType, prost::UnknownEnumValue> {
        PayloadType::try_from(self.r#type)
    }
}

// Every sample message shares the same fields apart from `val`
macro_rules! sample_message {
    ($name:ident { $($val:tt)* }) => {
        #[derive(Clone, PartialEq, Message)]
        pub struct $name {
            #[prost(uint32, required, tag = "1")]
            pub secondsintoyear: u32,
            #[prost(uint32, required, tag = "2")]
            pub nano: u32,
            $($val)*
            #[prost(int32, optional, tag = "4")]
            pub severity: Option<i32>,
            #[prost(int32, optional, tag = "5")]
            pub status: Option<i32>,
            #[prost(uint32, optional, tag = "6")]
            pub repeatcount: Option<u32>,
            #[prost(message, repeated, tag = "7")]
            pub fieldvalues: Vec<FieldValue>,
            #[prost(bool, optional, tag = "8")]
            pub fieldactualchange: Option<bool>,
        }
    };
}

sample_message!(ScalarString {
    #[prost(string, required, tag = "3")]
    pub val: String,
});
sample_message!(ScalarShort {
    #[prost(sint32, required, tag = "3")]
    pub val: i32,
});
sample_message!(ScalarFloat {
    #[prost(float, required, tag = "3")]
    pub val: f32,
});
sample_message!(ScalarEnum {
    #[prost(sint32, required, tag = "3")]
    pub val: i32,
});
sample_message!(ScalarByte {
    #[prost(bytes = "vec", required, tag = "3")]
    pub val: Vec<u8>,
});
sample_message!(ScalarInt {
    #[prost(sfixed32, required, tag = "3")]
    pub val: i32,
});
sample_message!(ScalarDouble {
    #[prost(double, required, tag = "3")]
    pub val: f64,
});
sample_message!(VectorString {
    #[prost(string, repeated, tag = "3")]
    pub val: Vec<String>,
});
sample_message!(VectorShort {
    #[prost(sint32, repeated, packed = "true", tag = "3")]
    pub val: Vec<i32>,
});
sample_message!(VectorFloat {
    #[prost(float, repeated, packed = "true", tag = "3")]
    pub val: Vec<f32>,
});
sample_message!(VectorEnum {
    #[prost(sint32, repeated, packed = "true", tag = "3")]
    pub val: Vec<i32>,
});
sample_message!(VectorChar {
    #[prost(bytes = "vec", required, tag = "3")]
    pub val: Vec<u8>,
});
sample_message!(VectorInt {
    #[prost(sfixed32, repeated, packed = "true", tag = "3")]
    pub val: Vec<i32>,
});
sample_message!(VectorDouble {
    #[prost(double, repeated, packed = "true", tag = "3")]
    pub val: Vec<f64>,
});
sample_message!(V4GenericBytes {
    #[prost(bytes = "vec", required, tag = "3")]
    pub val: Vec<u8>,
});

/// The part of a sample that isn't its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub secondsintoyear: u32,
    pub nano: u32,
    pub severity: i32,
    pub status: i32,
}

pub trait Sample: Message + Default {
    /// Column element type
    type Value;

    fn stamp(&self) -> Stamp;
    fn into_value(self) -> Self::Value;
    fn column(values: Vec<Self::Value>) -> Values;
}

macro_rules! sample {
    ($name:ident, $variant:ident, $value:ty, |$v:ident| $conv:expr) => {
        impl Sample for $name {
            type Value = $value;

            fn stamp(&self) -> Stamp {
                Stamp {
                    secondsintoyear: self.secondsintoyear,
                    nano: self.nano,
                    severity: self.severity.unwrap_or(0),
                    status: self.status.unwrap_or(0),
                }
            }

            fn into_value(self) -> $value {
                let $v = self.val;
                $conv
            }

            fn column(values: Vec<$value>) -> Values {
                Values::$variant(values)
            }
        }
    };
}

sample!(ScalarString, String, String, |v| v);
sample!(ScalarShort, Short, i16, |v| v as i16);
sample!(ScalarFloat, Float, f32, |v| v);
sample!(ScalarEnum, Enum, i16, |v| v as i16);
sample!(ScalarByte, Byte, i8, |v| v.first().map_or(0, |b| *b as i8));
sample!(ScalarInt, Int, i32, |v| v);
sample!(ScalarDouble, Double, f64, |v| v);
sample!(VectorString, VectorString, Vec<String>, |v| v);
sample!(VectorShort, VectorShort, Vec<i16>, |v| v.into_iter().map(|x| x as i16).collect());
sample!(VectorFloat, VectorFloat, Vec<f32>, |v| v);
sample!(VectorEnum, VectorEnum, Vec<i16>, |v| v.into_iter().map(|x| x as i16).collect());
sample!(VectorChar, VectorByte, Vec<i8>, |v| v.into_iter().map(|x| x as i8).collect());
sample!(VectorInt, VectorInt, Vec<i32>, |v| v);
sample!(VectorDouble, VectorDouble, Vec<f64>, |v| v);
sample!(V4GenericBytes, GenericBytes, Vec<u8>, |v| v);
