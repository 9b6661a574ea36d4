//! The recursive required-field check.

use crate::error::EncodeError;
use crate::message::DynamicMessage;
use crate::table::Coder;
use crate::value::Value;

use super::encode::populated_value;

/// Verify that every proto2 required field is populated, in this message
/// and in every populated message value reachable from it. Fails with
/// `RequiredNotSet` naming the first missing field's full name.
///
/// Proto3 cannot declare required fields, so for pure proto3 schemas this
/// reduces to a cheap flag check.
pub fn check_initialized(m: &DynamicMessage) -> Result<(), EncodeError> {
    let info = m.descriptor().coder_info();
    if !info.needs_init_check && m.populated_extensions().next().is_none() {
        return Ok(());
    }

    for cf in info.fields.iter() {
        if cf.is_required && populated_value(m, cf).is_none() {
            let field = m.descriptor().field(cf.index as usize);
            return Err(EncodeError::RequiredNotSet {
                field: field.full_name().to_owned(),
            });
        }
        let Some(value) = populated_value(m, cf) else {
            continue;
        };
        match cf.coder {
            Coder::Message | Coder::Group => {
                let child = value.as_message().expect("typed on set");
                check_initialized(child)?;
            }
            Coder::ListMessage | Coder::ListGroup => {
                let list = value.as_list().expect("typed on set");
                for element in list {
                    let child = element.as_message().expect("typed on set");
                    check_initialized(child)?;
                }
            }
            Coder::Map { value_kind, .. } => {
                if matches!(
                    value_kind,
                    crate::descriptor::Kind::Message | crate::descriptor::Kind::Group
                ) {
                    let map = value.as_map().expect("typed on set");
                    for entry in map.values() {
                        let child = entry.as_message().expect("typed on set");
                        check_initialized(child)?;
                    }
                }
            }
            _ => {}
        }
    }

    for (_, value) in m.populated_extensions() {
        match value {
            Value::Message(child) => check_initialized(child)?,
            Value::List(list) => {
                for element in list {
                    if let Value::Message(child) = element {
                        check_initialized(child)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}
