//! LZWDecode

use weezl::BitOrder;
use weezl::decode::Decoder;
use weezl::encode::Encoder;

use super::StreamFilter;
use super::params::{PredictorParams, early_change};
use super::predictor;
use crate::error::{Error, Result};
use crate::pdf::object::Dictionary;

#[derive(Debug, Clone, Copy, Default)]
pub struct Lzw;

impl StreamFilter for Lzw {
    fn name(&self) -> &str {
        "LZWDecode"
    }

    fn decode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let mut decoder = if early_change(params) {
            Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            Decoder::new(BitOrder::Msb, 8)
        };
        let mut out = decoder
            .decode(data)
            .map_err(|e| Error::filter(format!("LZWDecode failed: {e:?}")))?;
        let params = PredictorParams::from_dict(params);
        if params.is_active() {
            out = predictor::decode(&out, &params)?;
        }
        Ok(out)
    }

    fn encode(&self, data: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
        let predictor_params = PredictorParams::from_dict(params);
        let input = if predictor_params.is_active() {
            predictor::encode(data, &predictor_params)?
        } else {
            data.to_vec()
        };
        let mut encoder = if early_change(params) {
            Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            Encoder::new(BitOrder::Msb, 8)
        };
        encoder
            .encode(&input)
            .map_err(|e| Error::filter(format!("LZWEncode failed: {e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzw_roundtrip() {
        let original = b"ABCABCABCABCABCABCABC";
        let encoded = Lzw.encode(original, None).unwrap();
        assert_eq!(Lzw.decode(&encoded, None).unwrap(), original);
    }

    #[test]
    fn test_lzw_late_change_roundtrip() {
        let params = Dictionary::new().with("EarlyChange", 0);
        let original: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let encoded = Lzw.encode(&original, Some(&params)).unwrap();
        assert_eq!(Lzw.decode(&encoded, Some(&params)).unwrap(), original);
    }
}
