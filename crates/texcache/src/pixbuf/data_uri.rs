use data_url::DataUrl;

use crate::caching::{CacheEntry, CacheError};

/// Media types that can be embedded in `data:` URIs.
const DATA_URI_MEDIA_TYPES: &[(&str, &str)] = &[("image", "png"), ("image", "x-icon")];

/// Whether `uri` uses the `data:` scheme.
pub fn is_data_uri(uri: &str) -> bool {
    uri.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Returns the bytes embedded in a `data:` URI.
///
/// The payload may be base64 or percent encoded. Only PNG and icon images are accepted.
pub fn decode_data_uri(uri: &str) -> CacheEntry<Vec<u8>> {
    let url = DataUrl::process(uri)
        .map_err(|_| CacheError::Malformed(String::from("invalid `data:` uri")))?;

    let mime = url.mime_type();
    let supported = DATA_URI_MEDIA_TYPES
        .iter()
        .any(|(type_, subtype)| mime.type_ == *type_ && mime.subtype == *subtype);
    if !supported {
        return Err(CacheError::Unsupported(format!(
            "`data:` uri with media type {}/{}",
            mime.type_, mime.subtype
        )));
    }

    let (data, _fragment) = url
        .decode_to_vec()
        .map_err(|_| CacheError::Malformed(String::from("invalid base64 in `data:` uri")))?;
    Ok(data)
}
