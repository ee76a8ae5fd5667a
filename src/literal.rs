//! Typed literals for index key patterns and `$type` predicates, so that
//! declared targets don't have to spell out `1`, `-1` or `"array"` by hand.

use std::fmt;
use bson::{ Bson, to_bson };
use serde::{
    ser::{ Serialize, Serializer, SerializeSeq },
    de::{ Deserialize, Deserializer, Visitor, SeqAccess },
};

/// Direction of a single key within an ordered index.
/// ```
/// # #[macro_use]
/// # extern crate bson;
/// # use feedshape::literal::Order;
/// #
/// # fn main() {
/// let keys = doc! {
///     "receiverId": Order::Ascending,
///     "createdAt": Order::Descending,
/// };
/// assert_eq!(keys, doc!{ "receiverId": 1, "createdAt": -1 });
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Order {
    /// Order smaller values first.
    Ascending  =  1,
    /// Order greater values first.
    Descending = -1,
}

/// The default ordering is `Ascending`.
impl Default for Order {
    fn default() -> Self {
        Order::Ascending
    }
}

impl From<Order> for Bson {
    fn from(order: Order) -> Self {
        Bson::I32(order as _)
    }
}

impl Serialize for Order {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_i32(*self as _)
    }
}

/// Index specifications created from the mongo shell store their
/// directions as doubles, hence the float case.
impl<'a> Deserialize<'a> for Order {
    fn deserialize<D: Deserializer<'a>>(de: D) -> Result<Self, D::Error> {
        de.deserialize_i32(OrderVisitor)
    }
}

/// A serde visitor that produces an `Order` from +1 or -1.
struct OrderVisitor;

impl<'a> Visitor<'a> for OrderVisitor {
    type Value = Order;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an integer expressing ordering: 1 or -1")
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
        match v {
             1 => Ok(Order::Ascending),
            -1 => Ok(Order::Descending),
            _  => Err(E::custom(format!("invalid ordering: {}", v))),
        }
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
        if v == 1 {
            Ok(Order::Ascending)
        } else {
            Err(E::custom(format!("invalid ordering: {}", v)))
        }
    }

    #[allow(clippy::float_cmp)]
    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if v == 1.0 {
            Ok(Order::Ascending)
        } else if v == -1.0 {
            Ok(Order::Descending)
        } else {
            Err(E::custom(format!("invalid ordering: {}", v)))
        }
    }
}

/// The kind of index applied to a single key of a key pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// An ordered index field.
    Ordered(Order),
    /// Language-specific textual index.
    Text,
    /// Hashed index for hash-based sharding.
    Hashed,
    /// 2D geospatial index with spherical geometry.
    Geo2DSphere,
}

impl From<Order> for IndexType {
    fn from(order: Order) -> Self {
        IndexType::Ordered(order)
    }
}

impl From<IndexType> for Bson {
    fn from(index_type: IndexType) -> Self {
        match index_type {
            IndexType::Ordered(order) => Bson::from(order),
            IndexType::Text           => Bson::from("text"),
            IndexType::Hashed         => Bson::from("hashed"),
            IndexType::Geo2DSphere    => Bson::from("2dsphere"),
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            IndexType::Ordered(order) => write!(f, "{}", order as i32),
            IndexType::Text           => f.write_str("text"),
            IndexType::Hashed         => f.write_str("hashed"),
            IndexType::Geo2DSphere    => f.write_str("2dsphere"),
        }
    }
}

impl Serialize for IndexType {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        Bson::from(*self).serialize(ser)
    }
}

impl<'a> Deserialize<'a> for IndexType {
    fn deserialize<D: Deserializer<'a>>(de: D) -> Result<Self, D::Error> {
        de.deserialize_any(IndexTypeVisitor)
    }
}

/// Produces an `IndexType` from either an ordering number or a type string.
struct IndexTypeVisitor;

impl<'a> Visitor<'a> for IndexTypeVisitor {
    type Value = IndexType;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an ordering number or an index type string")
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
        OrderVisitor.visit_i64(v).map(IndexType::Ordered)
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
        OrderVisitor.visit_u64(v).map(IndexType::Ordered)
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
        OrderVisitor.visit_f64(v).map(IndexType::Ordered)
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        match v {
            "text"     => Ok(IndexType::Text),
            "hashed"   => Ok(IndexType::Hashed),
            "2dsphere" => Ok(IndexType::Geo2DSphere),
            _ => Err(E::custom(format!("unrecognized index type: {}", v))),
        }
    }
}

bitflags! {
    /// Sets of BSON types, for `$type` predicates and for describing which
    /// shapes a field may legitimately take.
    ///
    /// ```
    /// # #[macro_use]
    /// # extern crate bson;
    /// # use feedshape::literal::BsonType;
    /// #
    /// # fn main() {
    /// let types = BsonType::ARRAY | BsonType::NULL;
    /// let predicate = doc!{ "$type": types };
    /// assert_eq!(predicate, doc!{ "$type": ["null", "array"] });
    /// # }
    /// ```
    pub struct BsonType: u16 {
        /// The `null` value.
        const NULL      = 0b0000_0000_0000_0001;
        /// `true` or `false`.
        const BOOL      = 0b0000_0000_0000_0010;
        /// Double-precision floating-point number.
        const DOUBLE    = 0b0000_0000_0000_0100;
        /// 32-bit signed integer.
        const INT       = 0b0000_0000_0000_1000;
        /// 64-bit signed integer.
        const LONG      = 0b0000_0000_0001_0000;
        /// Any of the numeric types.
        const NUMBER    = 0b0000_0000_0001_1100;
        /// `ObjectId`.
        const OBJECT_ID = 0b0000_0000_0100_0000;
        /// Timestamp.
        const TIMESTAMP = 0b0000_0000_1000_0000;
        /// Date and time.
        const DATE      = 0b0000_0001_0000_0000;
        /// String.
        const STRING    = 0b0000_0010_0000_0000;
        /// Regular expression and its matching options.
        const REGEX     = 0b0000_0100_0000_0000;
        /// Binary data.
        const BINARY    = 0b0000_1000_0000_0000;
        /// Array.
        const ARRAY     = 0b0001_0000_0000_0000;
        /// Embedded document.
        const DOCUMENT  = 0b0010_0000_0000_0000;
    }
}

impl BsonType {
    /// The single type flag of a concrete value. Deprecated or exotic
    /// types (symbols, JavaScript code) map to the empty set, so they are
    /// never considered to match any expectation.
    pub fn of(value: &Bson) -> Self {
        match *value {
            Bson::Null              => BsonType::NULL,
            Bson::Boolean(_)        => BsonType::BOOL,
            Bson::FloatingPoint(_)  => BsonType::DOUBLE,
            Bson::I32(_)            => BsonType::INT,
            Bson::I64(_)            => BsonType::LONG,
            Bson::ObjectId(_)       => BsonType::OBJECT_ID,
            Bson::TimeStamp(_)      => BsonType::TIMESTAMP,
            Bson::UtcDatetime(_)    => BsonType::DATE,
            Bson::String(_)         => BsonType::STRING,
            Bson::RegExp(..)        => BsonType::REGEX,
            Bson::Binary(..)        => BsonType::BINARY,
            Bson::Array(_)          => BsonType::ARRAY,
            Bson::Document(_)       => BsonType::DOCUMENT,
            _                       => BsonType::empty(),
        }
    }

    /// Whether `value` has one of the types in this set.
    pub fn admits(self, value: &Bson) -> bool {
        self.intersects(Self::of(value))
    }
}

/// The default BSON type is `null`.
impl Default for BsonType {
    fn default() -> Self {
        BsonType::NULL
    }
}

/// Encoding a non-empty `BsonType` never fails; the empty set encodes as `null`.
impl From<BsonType> for Bson {
    fn from(bson_type: BsonType) -> Self {
        to_bson(&bson_type).unwrap_or_default()
    }
}

impl fmt::Display for BsonType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<_> = TYPE_NAMES
            .iter()
            .filter(|&&(flag, _)| self.contains(flag))
            .map(|&(_, name)| name)
            .collect();

        f.write_str(&names.join("|"))
    }
}

/// All distinct BSON type bitflags, along with their `$type` aliases.
static TYPE_NAMES: &[(BsonType, &str)] = &[
    (BsonType::NULL,      "null"),
    (BsonType::BOOL,      "bool"),
    (BsonType::DOUBLE,    "double"),
    (BsonType::INT,       "int"),
    (BsonType::LONG,      "long"),
    (BsonType::OBJECT_ID, "objectId"),
    (BsonType::TIMESTAMP, "timestamp"),
    (BsonType::DATE,      "date"),
    (BsonType::STRING,    "string"),
    (BsonType::REGEX,     "regex"),
    (BsonType::BINARY,    "binData"),
    (BsonType::ARRAY,     "array"),
    (BsonType::DOCUMENT,  "object"),
];

impl Serialize for BsonType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error;

        match self.bits().count_ones() {
            0 => Err(S::Error::custom("at least one type must be specified")),
            1 => match TYPE_NAMES.iter().find(|&&(flag, _)| self.contains(flag)) {
                Some(&(_, name)) => serializer.serialize_str(name),
                None => Err(S::Error::custom("found an unexpected flag")),
            },
            n => {
                let mut seq = serializer.serialize_seq(Some(n as usize))?;

                for &(flag, name) in TYPE_NAMES {
                    if self.contains(flag) {
                        seq.serialize_element(name)?;
                    }
                }

                seq.end()
            }
        }
    }
}

impl<'a> Deserialize<'a> for BsonType {
    fn deserialize<D: Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BsonTypeVisitor)
    }
}

/// Converts a `$type` alias or an array thereof to a `BsonType` bitflag.
#[derive(Debug, Clone, Copy)]
struct BsonTypeVisitor;

impl BsonTypeVisitor {
    /// Attempts to convert a BSON type alias to a `BsonType` bitflag.
    fn bitflag_for_name<E: serde::de::Error>(name: &str) -> Result<BsonType, E> {
        match TYPE_NAMES.iter().find(|&&(_, n)| n == name) {
            Some(&(flag, _)) => Ok(flag),
            None => Err(E::custom(format!("unknown BSON type alias: '{}'", name))),
        }
    }
}

impl<'a> Visitor<'a> for BsonTypeVisitor {
    type Value = BsonType;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a BSON type alias string or an array of BSON type alias strings")
    }

    fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Self::bitflag_for_name(value)
    }

    fn visit_seq<A: SeqAccess<'a>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut flags = BsonType::empty();

        while let Some(name) = seq.next_element::<String>()? {
            flags |= Self::bitflag_for_name(&name)?;
        }

        Ok(flags)
    }
}
