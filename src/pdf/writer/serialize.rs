//! Object serialization

use std::io::Write;

use crate::error::{Error, Result};
use crate::pdf::object::{Array, Dictionary, Name, ObjRef, Object, PdfString, Stream};

/// Render `obj` for display and diagnostics. Streams whose encoded form is
/// not available are rendered with their decoded bytes.
pub fn to_bytes(obj: &Object) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_inner(obj, &mut out, false)?;
    Ok(out)
}

/// Serialize a direct object. Streams must already carry their encoded
/// payload when a filter is declared.
pub fn write_object<W: Write>(obj: &Object, out: &mut W) -> Result<()> {
    write_inner(obj, out, true)
}

/// `n g obj ... endobj` record.
pub fn write_indirect<W: Write>(id: ObjRef, obj: &Object, out: &mut W) -> Result<()> {
    writeln!(out, "{} {} obj", id.num, id.generation)?;
    write_object(obj, out)?;
    out.write_all(b"\nendobj\n")?;
    Ok(())
}

fn write_inner<W: Write>(obj: &Object, out: &mut W, strict: bool) -> Result<()> {
    match obj {
        Object::Null => out.write_all(b"null")?,
        Object::Bool(true) => out.write_all(b"true")?,
        Object::Bool(false) => out.write_all(b"false")?,
        Object::Int(i) => write!(out, "{i}")?,
        Object::Real(r) => out.write_all(format_real(*r)?.as_bytes())?,
        Object::String(s) => write_string(s, out)?,
        Object::Name(n) => write_name(n, out)?,
        Object::Array(a) => write_array(a, out, strict)?,
        Object::Dict(d) => write_dict(d, out, strict)?,
        Object::Stream(s) => write_stream(s, out, strict)?,
        Object::Ref(r) => write!(out, "{} {} R", r.num, r.generation)?,
    }
    Ok(())
}

/// Reals always carry a decimal point so they read back as reals. NaN and
/// infinities have no syntax and are rejected.
pub fn format_real(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(Error::invariant(format!("non-finite real {value}")));
    }
    let s = value.to_string();
    Ok(if s.contains('.') { s } else { format!("{s}.0") })
}

fn needs_name_escape(b: u8) -> bool {
    !(b'!'..=b'~').contains(&b)
        || b == b'#'
        || matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

pub fn write_name<W: Write>(name: &Name, out: &mut W) -> Result<()> {
    out.write_all(b"/")?;
    for &b in name.as_bytes() {
        if needs_name_escape(b) {
            write!(out, "#{b:02X}")?;
        } else {
            out.write_all(&[b])?;
        }
    }
    Ok(())
}

pub fn write_string<W: Write>(s: &PdfString, out: &mut W) -> Result<()> {
    if s.is_binary() {
        out.write_all(b"<")?;
        for b in s.as_bytes() {
            write!(out, "{b:02X}")?;
        }
        out.write_all(b">")?;
        return Ok(());
    }
    out.write_all(b"(")?;
    for &b in s.as_bytes() {
        match b {
            b'(' | b')' | b'\\' => out.write_all(&[b'\\', b])?,
            b'\n' => out.write_all(b"\\n")?,
            b'\r' => out.write_all(b"\\r")?,
            b'\t' => out.write_all(b"\\t")?,
            0x08 => out.write_all(b"\\b")?,
            0x0C => out.write_all(b"\\f")?,
            b' '..=b'~' => out.write_all(&[b])?,
            _ => write!(out, "\\{b:03o}")?,
        }
    }
    out.write_all(b")")?;
    Ok(())
}

fn write_array<W: Write>(array: &Array, out: &mut W, strict: bool) -> Result<()> {
    out.write_all(b"[")?;
    for (i, item) in array.iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write_inner(item, out, strict)?;
    }
    out.write_all(b"]")?;
    Ok(())
}

fn write_dict<W: Write>(dict: &Dictionary, out: &mut W, strict: bool) -> Result<()> {
    out.write_all(b"<<")?;
    for (key, value) in dict.iter() {
        out.write_all(b" ")?;
        write_name(key, out)?;
        out.write_all(b" ")?;
        write_inner(value, out, strict)?;
    }
    out.write_all(b" >>")?;
    Ok(())
}

fn write_stream<W: Write>(stream: &Stream, out: &mut W, strict: bool) -> Result<()> {
    let payload = match (stream.encoded_data(), stream.decoded_data()) {
        (Some(encoded), _) => encoded,
        (None, Some(decoded)) if !strict || stream.filters().is_empty() => decoded,
        _ => return Err(Error::invariant("stream payload has not been encoded")),
    };
    if strict && stream.dict().get_int("Length") != Some(payload.len() as i64) {
        return Err(Error::invariant("stream Length does not match its payload"));
    }
    write_dict(stream.dict(), out, strict)?;
    out.write_all(b"\nstream\n")?;
    out.write_all(payload)?;
    out.write_all(b"\nendstream")?;
    Ok(())
}
