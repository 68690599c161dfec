use serde::ser;
use crate::Error;

// Bencode dictionary keys must be byte strings compared in their raw form,
// not their encoded (length-prefixed) form. This serializer extracts the raw
// bytes of a key so SerializeMap can sort and later emit it correctly.
pub struct StringSerializer;

fn unsupported(what: &str) -> Error {
    Error::InvalidType(format!("map keys must be strings, found {what}"))
}

impl ser::Serializer for &mut StringSerializer {
    type Ok = Vec<u8>;
    type Error = Error;

    type SerializeSeq = ser::Impossible<Vec<u8>, Error>;
    type SerializeTuple = ser::Impossible<Vec<u8>, Error>;
    type SerializeTupleStruct = ser::Impossible<Vec<u8>, Error>;
    type SerializeTupleVariant = ser::Impossible<Vec<u8>, Error>;
    type SerializeMap = ser::Impossible<Vec<u8>, Error>;
    type SerializeStruct = ser::Impossible<Vec<u8>, Error>;
    type SerializeStructVariant = ser::Impossible<Vec<u8>, Error>;

    fn serialize_bytes(self, v: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(v.to_vec())
    }

    fn serialize_str(self, v: &str) -> Result<Vec<u8>, Error> {
        Ok(v.as_bytes().to_vec())
    }

    fn serialize_char(self, v: char) -> Result<Vec<u8>, Error> {
        let mut buf = [0; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Vec<u8>, Error> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: ?Sized>(self, _name: &'static str, value: &T) -> Result<Vec<u8>, Error>
        where T: serde::Serialize
    {
        value.serialize(self)
    }

    fn serialize_bool(self, _: bool) -> Result<Vec<u8>, Error> { Err(unsupported("bool")) }
    fn serialize_i8(self, _: i8) -> Result<Vec<u8>, Error> { Err(unsupported("i8")) }
    fn serialize_i16(self, _: i16) -> Result<Vec<u8>, Error> { Err(unsupported("i16")) }
    fn serialize_i32(self, _: i32) -> Result<Vec<u8>, Error> { Err(unsupported("i32")) }
    fn serialize_i64(self, _: i64) -> Result<Vec<u8>, Error> { Err(unsupported("i64")) }
    fn serialize_u8(self, _: u8) -> Result<Vec<u8>, Error> { Err(unsupported("u8")) }
    fn serialize_u16(self, _: u16) -> Result<Vec<u8>, Error> { Err(unsupported("u16")) }
    fn serialize_u32(self, _: u32) -> Result<Vec<u8>, Error> { Err(unsupported("u32")) }
    fn serialize_u64(self, _: u64) -> Result<Vec<u8>, Error> { Err(unsupported("u64")) }
    fn serialize_f32(self, _: f32) -> Result<Vec<u8>, Error> { Err(unsupported("f32")) }
    fn serialize_f64(self, _: f64) -> Result<Vec<u8>, Error> { Err(unsupported("f64")) }
    fn serialize_none(self) -> Result<Vec<u8>, Error> { Err(unsupported("none")) }

    fn serialize_some<T: ?Sized>(self, value: &T) -> Result<Vec<u8>, Error>
        where T: serde::Serialize
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Vec<u8>, Error> { Err(unsupported("unit")) }
    fn serialize_unit_struct(self, _name: &'static str) -> Result<Vec<u8>, Error> { Err(unsupported("unit struct")) }

    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Vec<u8>, Error>
        where T: serde::Serialize
    {
        Err(unsupported("newtype variant"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Error> { Err(unsupported("seq")) }
    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Error> { Err(unsupported("tuple")) }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> { Err(unsupported("tuple struct")) }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> { Err(unsupported("tuple variant")) }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> { Err(unsupported("map")) }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> { Err(unsupported("struct")) }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> { Err(unsupported("struct variant")) }
}
