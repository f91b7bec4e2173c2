use crate::error::Result;

/// Downloads a feed archive over HTTP, failing on non-success statuses.
pub fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let resp = reqwest::blocking::get(url)?.error_for_status()?;
    Ok(resp.bytes()?.to_vec())
}
