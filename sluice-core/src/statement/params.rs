use crate::{Result, SluiceError, Value, truncate_long};
use std::{collections::HashMap, fmt::Write};

fn binding_error(message: String, sql: &str) -> crate::Error {
    SluiceError::ParameterBinding {
        message,
        sql: truncate_long!(sql).to_string(),
    }
    .into()
}

/// Rewrites the `@n` placeholders of `sql`, that refer to `args`, so that they refer to the
/// values appended to `dest`.
///
/// Placeholders are renumbered densely in order of first appearance and repeated
/// references share the same slot. A list argument expands into `@a,@b,..` (or `NULL` when
/// empty). `@@` is an escaped `@` and is copied untouched, as is everything inside
/// quoted literals and bracketed identifiers.
pub fn process_params(sql: &str, args: &[Value], dest: &mut Vec<Value>) -> Result<String> {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut slots = HashMap::<usize, String>::new();
    let bytes = sql.as_bytes();
    let mut position = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'[' | b'"' => {
                let close = match bytes[i] {
                    b'[' => b']',
                    c => c,
                };
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == close {
                        if bytes.get(i + 1) == Some(&close) {
                            i += 1;
                        } else {
                            break;
                        }
                    }
                    i += 1;
                }
                i += 1;
            }
            b'@' if bytes.get(i + 1) == Some(&b'@') => i += 2,
            b'@' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end == start {
                    i += 1;
                    continue;
                }
                let name = &sql[start..end];
                let index = name.parse::<usize>().map_err(|_| {
                    binding_error(format!("Parameter `@{name}` is not positional"), sql)
                })?;
                let Some(arg) = args.get(index) else {
                    return Err(binding_error(
                        format!(
                            "Parameter `@{index}` is out of range of the {} supplied arguments",
                            args.len()
                        ),
                        sql,
                    ));
                };
                out.push_str(&sql[position..i]);
                let slot = slots.entry(index).or_insert_with(|| {
                    let mut slot = String::new();
                    match arg {
                        Value::List(items, ..) => match items.as_deref() {
                            None | Some([]) => slot.push_str("NULL"),
                            Some(items) => {
                                for (n, item) in items.iter().enumerate() {
                                    if n > 0 {
                                        slot.push(',');
                                    }
                                    let _ = write!(slot, "@{}", dest.len());
                                    dest.push(item.clone());
                                }
                            }
                        },
                        _ => {
                            let _ = write!(slot, "@{}", dest.len());
                            dest.push(arg.clone());
                        }
                    }
                    slot
                });
                out.push_str(slot);
                position = end;
                i = end;
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[position..]);
    Ok(out)
}
