use std::borrow::Cow;

use heed::{BoxedError, BytesDecode, BytesEncode};
use roaring::RoaringBitmap;

/// A minimal heed codec for [`RoaringBitmap`], used for the secondary
/// indices (by program, by donor, by analysis) that back `GetFiles`'
/// set-membership filters.
///
/// milli ships its own `RoaringBitmapCodec`; we are not depending on milli
/// (it is the search engine proper, out of scope for this service), so we
/// reimplement the same thin wrapper over `roaring`'s own serialization.
pub struct RoaringBitmapCodec;

impl BytesEncode<'_> for RoaringBitmapCodec {
    type EItem = RoaringBitmap;

    fn bytes_encode(item: &Self::EItem) -> Result<Cow<'_, [u8]>, BoxedError> {
        let mut bytes = Vec::with_capacity(item.serialized_size());
        item.serialize_into(&mut bytes)?;
        Ok(Cow::Owned(bytes))
    }
}

impl BytesDecode<'_> for RoaringBitmapCodec {
    type DItem = RoaringBitmap;

    fn bytes_decode(bytes: &[u8]) -> Result<Self::DItem, BoxedError> {
        Ok(RoaringBitmap::deserialize_from(bytes)?)
    }
}
