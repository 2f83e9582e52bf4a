// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A minimal XML-RPC codec: just enough of the spec to drive the
//! supervisor's process-control API (§4.3, §6.2). Hand-rolled rather than
//! pulled from a third-party XML-RPC crate, in the same spirit as
//! `oj-wire` owning its own wire format in a dedicated module rather than
//! depending on a generic RPC framework.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Struct(Vec<(String, Value)>),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_struct()?.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

#[derive(Debug, Error)]
pub enum XmlRpcError {
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed XML-RPC document: {0}")]
    Malformed(String),
    #[error("supervisor returned fault {code}: {message}")]
    Fault { code: i64, message: String },
}

/// Encode a `methodCall` request body for `method` with positional `args`.
pub fn encode_call(method: &str, args: &[Value]) -> Result<Vec<u8>, XmlRpcError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Start(BytesStart::new("methodCall")))?;
    write_elem_text(&mut writer, "methodName", method)?;
    writer.write_event(Event::Start(BytesStart::new("params")))?;
    for arg in args {
        writer.write_event(Event::Start(BytesStart::new("param")))?;
        write_value(&mut writer, arg)?;
        writer.write_event(Event::End(BytesEnd::new("param")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("params")))?;
    writer.write_event(Event::End(BytesEnd::new("methodCall")))?;

    Ok(writer.into_inner().into_inner())
}

fn write_elem_text(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), XmlRpcError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_value(writer: &mut Writer<Cursor<Vec<u8>>>, value: &Value) -> Result<(), XmlRpcError> {
    writer.write_event(Event::Start(BytesStart::new("value")))?;
    match value {
        Value::String(s) => write_elem_text(writer, "string", s)?,
        Value::Int(i) => write_elem_text(writer, "int", &i.to_string())?,
        Value::Bool(b) => write_elem_text(writer, "boolean", if *b { "1" } else { "0" })?,
        Value::Array(items) => {
            writer.write_event(Event::Start(BytesStart::new("array")))?;
            writer.write_event(Event::Start(BytesStart::new("data")))?;
            for item in items {
                write_value(writer, item)?;
            }
            writer.write_event(Event::End(BytesEnd::new("data")))?;
            writer.write_event(Event::End(BytesEnd::new("array")))?;
        }
        Value::Struct(fields) => {
            writer.write_event(Event::Start(BytesStart::new("struct")))?;
            for (name, field_value) in fields {
                writer.write_event(Event::Start(BytesStart::new("member")))?;
                write_elem_text(writer, "name", name)?;
                write_value(writer, field_value)?;
                writer.write_event(Event::End(BytesEnd::new("member")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("struct")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("value")))?;
    Ok(())
}

/// The outcome of a `methodResponse`: either the single returned value or
/// a supervisor fault (code + string), per the XML-RPC fault convention
/// supervisord uses for every process-control error (§6.2).
pub enum MethodResponse {
    Value(Value),
    Fault { code: i64, message: String },
}

/// Decode a `methodResponse` body into either its value or fault.
pub fn decode_response(body: &[u8]) -> Result<MethodResponse, XmlRpcError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut is_fault = false;
    let mut depth = 0usize;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = local_name(&e);
                if name == "fault" {
                    is_fault = true;
                }
                if name == "value" {
                    let value = read_value(&mut reader)?;
                    if is_fault {
                        let code = value
                            .field("faultCode")
                            .and_then(Value::as_int)
                            .ok_or_else(|| XmlRpcError::Malformed("missing faultCode".into()))?;
                        let message = value
                            .field("faultString")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        return Ok(MethodResponse::Fault { code, message });
                    }
                    return Ok(MethodResponse::Value(value));
                }
                depth += 1;
            }
            Event::End(_) => {
                if depth == 0 {
                    continue;
                }
                depth -= 1;
            }
            Event::Eof => {
                return Err(XmlRpcError::Malformed("methodResponse had no value".into()))
            }
            _ => {}
        }
        buf.clear();
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn read_value(reader: &mut Reader<&[u8]>) -> Result<Value, XmlRpcError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = local_name(&e);
                let value = match name.as_str() {
                    "string" => Value::String(read_text(reader)?),
                    "int" | "i4" | "i8" => {
                        let text = read_text(reader)?;
                        Value::Int(text.trim().parse().map_err(|_| {
                            XmlRpcError::Malformed(format!("invalid integer {text:?}"))
                        })?)
                    }
                    "boolean" => {
                        let text = read_text(reader)?;
                        Value::Bool(text.trim() == "1")
                    }
                    "struct" => read_struct(reader)?,
                    "array" => read_array(reader)?,
                    _ => continue,
                };
                return Ok(value);
            }
            Event::Text(t) => {
                // Bare string (no <string> tag is allowed by the spec).
                let text = t.unescape()?.to_string();
                if !text.trim().is_empty() {
                    return Ok(Value::String(text));
                }
            }
            Event::End(e) if local_name_end(&e) == "value" => {
                return Ok(Value::String(String::new()));
            }
            Event::Eof => return Err(XmlRpcError::Malformed("unexpected EOF in value".into())),
            _ => {}
        }
        buf.clear();
    }
}

fn local_name_end(e: &BytesEnd) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn read_text(reader: &mut Reader<&[u8]>) -> Result<String, XmlRpcError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::End(_) => return Ok(text),
            Event::Eof => return Err(XmlRpcError::Malformed("unexpected EOF reading text".into())),
            _ => {}
        }
        buf.clear();
    }
}

fn read_struct(reader: &mut Reader<&[u8]>) -> Result<Value, XmlRpcError> {
    let mut fields = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(&e) == "member" => {
                let (name, value) = read_member(reader)?;
                fields.push((name, value));
            }
            Event::End(e) if local_name_end(&e) == "struct" => return Ok(Value::Struct(fields)),
            Event::Eof => return Err(XmlRpcError::Malformed("unexpected EOF in struct".into())),
            _ => {}
        }
        buf.clear();
    }
}

fn read_member(reader: &mut Reader<&[u8]>) -> Result<(String, Value), XmlRpcError> {
    let mut name = None;
    let mut value = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(&e) == "name" => name = Some(read_text(reader)?),
            Event::Start(e) if local_name(&e) == "value" => value = Some(read_value(reader)?),
            Event::End(e) if local_name_end(&e) == "member" => {
                let name = name.ok_or_else(|| XmlRpcError::Malformed("member missing name".into()))?;
                let value =
                    value.ok_or_else(|| XmlRpcError::Malformed("member missing value".into()))?;
                return Ok((name, value));
            }
            Event::Eof => return Err(XmlRpcError::Malformed("unexpected EOF in member".into())),
            _ => {}
        }
        buf.clear();
    }
}

fn read_array(reader: &mut Reader<&[u8]>) -> Result<Value, XmlRpcError> {
    let mut items = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(&e) == "value" => items.push(read_value(reader)?),
            Event::End(e) if local_name_end(&e) == "array" => return Ok(Value::Array(items)),
            Event::Eof => return Err(XmlRpcError::Malformed("unexpected EOF in array".into())),
            _ => {}
        }
        buf.clear();
    }
}
