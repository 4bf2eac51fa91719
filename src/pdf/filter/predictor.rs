//! PNG and TIFF predictors

use super::params::PredictorParams;
use crate::error::{Error, Result};

/// Undo the predictor transform after decompression.
pub fn decode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    let bpp = params.bytes_per_pixel();
    let row_len = params.bytes_per_row();
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => Ok(tiff_decode(data, row_len, bpp)),
        10..=15 => png_decode(data, row_len, bpp),
        other => Err(Error::filter(format!("unsupported predictor {other}"))),
    }
}

/// Apply the predictor transform before compression. PNG predictors
/// always use the Up filter on every row.
pub fn encode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    let bpp = params.bytes_per_pixel();
    let row_len = params.bytes_per_row();
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => Ok(tiff_encode(data, row_len, bpp)),
        10..=15 => Ok(png_up_encode(data, row_len)),
        other => Err(Error::filter(format!("unsupported predictor {other}"))),
    }
}

fn tiff_decode(data: &[u8], row_len: usize, bpp: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks(row_len) {
        let start = out.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { out[start + i - bpp] } else { 0 };
            out.push(byte.wrapping_add(left));
        }
    }
    out
}

fn tiff_encode(data: &[u8], row_len: usize, bpp: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks(row_len) {
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            out.push(byte.wrapping_sub(left));
        }
    }
    out
}

fn png_decode(data: &[u8], row_len: usize, bpp: usize) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    let mut row = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        let Some((&tag, body)) = chunk.split_first() else {
            continue;
        };
        // short final rows are zero padded
        row.fill(0);
        row[..body.len()].copy_from_slice(body);

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => return Err(Error::filter(format!("unknown PNG row filter {other}"))),
            };
            row[i] = row[i].wrapping_add(predicted);
        }
        out.extend_from_slice(&row);
        prev.copy_from_slice(&row);
    }
    Ok(out)
}

fn png_up_encode(data: &[u8], row_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / row_len.max(1) + 1);
    let mut prev = vec![0u8; row_len];
    for row in data.chunks(row_len) {
        out.push(2);
        for (i, &byte) in row.iter().enumerate() {
            out.push(byte.wrapping_sub(prev[i]));
        }
        prev.fill(0);
        prev[..row.len()].copy_from_slice(row);
    }
    out
}

pub fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (ia, ib, ic) = (i16::from(a), i16::from(b), i16::from(c));
    let p = ia + ib - ic;
    let (pa, pb, pc) = ((p - ia).abs(), (p - ib).abs(), (p - ic).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
