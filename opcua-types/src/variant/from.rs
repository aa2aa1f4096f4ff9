use uuid::Uuid;

use crate::{
    ByteString, DataValue, DateTime, DateTimeUtc, DiagnosticInfo, DynEncodable, Error,
    ExpandedNodeId, ExtensionObject, Guid, LocalizedText, NodeId, QualifiedName, StatusCode,
    UAString, VariantScalarTypeId,
};

use super::{Variant, XmlElement};

/// Trait for types that can be cast from a [`Variant`].
///
/// Unlike [`IntoVariant`](super::IntoVariant), this does not imply `TryFrom<Variant>`, since
/// the orphan rules block a blanket impl of that for foreign types.
pub trait TryFromVariant: Sized {
    /// Try to cast the given variant to this type.
    fn try_from_variant(v: Variant) -> Result<Self, Error>;
}

macro_rules! impl_try_from_variant_scalar {
    ($tp:ty, $vt:ident) => {
        impl TryFromVariant for $tp {
            fn try_from_variant(v: Variant) -> Result<Self, Error> {
                let cast = v.cast(VariantScalarTypeId::$vt);
                if let Variant::$vt(v) = cast {
                    Ok(v)
                } else {
                    Err(Error::new(
                        StatusCode::BadTypeMismatch,
                        concat!("Unable to convert variant to ", stringify!($vt)),
                    ))
                }
            }
        }
    };
}

macro_rules! impl_try_from_variant_boxed {
    ($tp:ty, $vt:ident) => {
        impl TryFromVariant for $tp {
            fn try_from_variant(v: Variant) -> Result<Self, Error> {
                let cast = v.cast(VariantScalarTypeId::$vt);
                if let Variant::$vt(v) = cast {
                    Ok(*v)
                } else {
                    Err(Error::new(
                        StatusCode::BadTypeMismatch,
                        concat!("Unable to convert variant to ", stringify!($vt)),
                    ))
                }
            }
        }
    };
}

impl_try_from_variant_scalar!(bool, Boolean);
impl_try_from_variant_scalar!(i8, SByte);
impl_try_from_variant_scalar!(u8, Byte);
impl_try_from_variant_scalar!(i16, Int16);
impl_try_from_variant_scalar!(u16, UInt16);
impl_try_from_variant_scalar!(i32, Int32);
impl_try_from_variant_scalar!(u32, UInt32);
impl_try_from_variant_scalar!(i64, Int64);
impl_try_from_variant_scalar!(u64, UInt64);
impl_try_from_variant_scalar!(f32, Float);
impl_try_from_variant_scalar!(f64, Double);
impl_try_from_variant_scalar!(UAString, String);
impl_try_from_variant_scalar!(XmlElement, XmlElement);
impl_try_from_variant_boxed!(DateTime, DateTime);
impl_try_from_variant_boxed!(Guid, Guid);
impl_try_from_variant_scalar!(StatusCode, StatusCode);
impl_try_from_variant_scalar!(ByteString, ByteString);
impl_try_from_variant_boxed!(QualifiedName, QualifiedName);
impl_try_from_variant_boxed!(LocalizedText, LocalizedText);
impl_try_from_variant_boxed!(NodeId, NodeId);
impl_try_from_variant_boxed!(ExpandedNodeId, ExpandedNodeId);
impl_try_from_variant_scalar!(ExtensionObject, ExtensionObject);
impl_try_from_variant_boxed!(DataValue, DataValue);
impl_try_from_variant_boxed!(DiagnosticInfo, DiagnosticInfo);

impl TryFromVariant for String {
    fn try_from_variant(v: Variant) -> Result<Self, Error> {
        Ok(UAString::try_from_variant(v)?.into())
    }
}

impl TryFromVariant for Uuid {
    fn try_from_variant(v: Variant) -> Result<Self, Error> {
        Ok(Guid::try_from_variant(v)?.into())
    }
}

impl TryFromVariant for DateTimeUtc {
    fn try_from_variant(v: Variant) -> Result<Self, Error> {
        Ok(DateTime::try_from_variant(v)?.as_chrono())
    }
}

impl<T> TryFromVariant for T
where
    T: DynEncodable,
{
    fn try_from_variant(v: Variant) -> Result<Self, Error> {
        let Variant::ExtensionObject(o) = v else {
            return Err(Error::new(
                StatusCode::BadTypeMismatch,
                "Variant is not extension object",
            ));
        };
        o.into_inner_as().map(|v| *v).ok_or_else(|| {
            Error::new(
                StatusCode::BadTypeMismatch,
                "Variant is extension object, but not requested type",
            )
        })
    }
}

impl<T> TryFromVariant for Option<T>
where
    T: TryFromVariant,
{
    fn try_from_variant(v: Variant) -> Result<Self, Error> {
        if v.is_empty() {
            return Ok(None);
        }
        Ok(Some(T::try_from_variant(v)?))
    }
}

impl<T> TryFromVariant for Vec<T>
where
    T: TryFromVariant,
{
    fn try_from_variant(v: Variant) -> Result<Self, Error> {
        match v {
            Variant::Empty => Err(Error::new(
                StatusCode::BadTypeMismatch,
                "Attempted to cast empty variant to array",
            )),
            Variant::Array(a) => a
                .values
                .into_iter()
                .map(|v| T::try_from_variant(v))
                .collect::<Result<Vec<_>, _>>(),
            r => Ok(vec![T::try_from_variant(r)?]),
        }
    }
}

impl TryFromVariant for Variant {
    fn try_from_variant(v: Variant) -> Result<Self, Error> {
        Ok(v)
    }
}

impl<const N: usize, T> TryFromVariant for [T; N]
where
    T: TryFromVariant,
{
    fn try_from_variant(v: Variant) -> Result<Self, Error> {
        let vals = match v {
            Variant::Empty => {
                return Err(Error::new(
                    StatusCode::BadTypeMismatch,
                    "Attempted to cast empty variant to array",
                ))
            }
            Variant::Array(a) => {
                if N != a.values.len() {
                    return Err(Error::new(
                        StatusCode::BadTypeMismatch,
                        "Array size mismatch",
                    ));
                }
                a.values
                    .into_iter()
                    .map(|v| T::try_from_variant(v))
                    .collect::<Result<Vec<_>, _>>()?
            }
            r => {
                if N != 1 {
                    return Err(Error::new(
                        StatusCode::BadTypeMismatch,
                        "Array size mismatch",
                    ));
                }
                vec![T::try_from_variant(r)?]
            }
        };

        vals.try_into()
            .map_err(|_| Error::new(StatusCode::BadTypeMismatch, "Array size mismatch"))
    }
}
