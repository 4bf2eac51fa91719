//! FlateDecode (zlib/deflate)

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::StreamFilter;
use super::params::PredictorParams;
use super::predictor;
use crate::error::{Error, Result};
use crate::pdf::object::Dictionary;

#[derive(Debug, Clone, Copy)]
pub struct Flate {
    pub level: u32,
}

impl Default for Flate {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl StreamFilter for Flate {
    fn name(&self) -> &str {
        "FlateDecode"
    }

    fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        let mut decoder = ZlibDecoder::new(data);
        if let Err(e) = decoder.read_to_end(&mut out) {
            // keep what inflated before a truncated or corrupt tail
            if out.is_empty() {
                return Err(Error::filter(format!("FlateDecode failed: {e}")));
            }
            tracing::debug!("FlateDecode stopped early after {} bytes: {}", out.len(), e);
        }
        let params = PredictorParams::from_dict(params);
        if params.is_active() {
            out = predictor::decode(&out, &params)?;
        }
        Ok(out)
    }

    fn encode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let params = PredictorParams::from_dict(params);
        let predicted;
        let input = if params.is_active() {
            predicted = predictor::encode(data, &params)?;
            &predicted[..]
        } else {
            data
        };
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level.min(9)));
        encoder
            .write_all(input)
            .map_err(|e| Error::filter(format!("FlateDecode encode failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| Error::filter(format!("FlateDecode encode failed: {e}")))
    }
}
