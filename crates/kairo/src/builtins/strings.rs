//! String prototype methods.
//!
//! The receiver must be a string primitive; indices are character-based to
//! match script semantics, so methods walk chars rather than bytes.

use crate::{
    eval::Interp,
    exception::{RunError, RunResult},
    value::Value,
};

use super::Builtin;

pub(crate) fn method(name: &str) -> Option<Builtin> {
    use Builtin::*;
    Some(match name {
        "charAt" => StrCharAt,
        "charCodeAt" => StrCharCodeAt,
        "slice" => StrSlice,
        "substring" => StrSubstring,
        "indexOf" => StrIndexOf,
        "includes" => StrIncludes,
        "split" => StrSplit,
        "trim" => StrTrim,
        "toUpperCase" => StrToUpperCase,
        "toLowerCase" => StrToLowerCase,
        "startsWith" => StrStartsWith,
        "endsWith" => StrEndsWith,
        "repeat" => StrRepeat,
        "replace" => StrReplace,
        "padStart" => StrPadStart,
        "padEnd" => StrPadEnd,
        "concat" => StrConcat,
        "toString" => ObjToString,
        _ => return None,
    })
}

pub(crate) fn call(interp: &mut Interp, b: Builtin, this: &Value, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    let Value::Str(s) = this else {
        return Err(RunError::type_error("String method called on a non-string receiver"));
    };
    let s: &str = s;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;

    let str_arg = |interp: &mut Interp, i: usize| -> String {
        args.get(i)
            .map(|v| v.to_display(interp.heap, interp.interner))
            .unwrap_or_default()
    };
    let num_arg = |interp: &mut Interp, i: usize, default: f64| -> RunResult<f64> {
        match args.get(i) {
            Some(Value::Undefined) | None => Ok(default),
            Some(v) => v.to_number(interp.heap),
        }
    };
    // Negative indices count from the end; clamp into range.
    let rel_index = |n: f64| -> usize {
        let n = if n.is_nan() { 0.0 } else { n };
        let i = n as i64;
        let i = if i < 0 { len + i } else { i };
        i.clamp(0, len) as usize
    };

    let result = match b {
        StrCharAt => {
            let i = num_arg(interp, 0, 0.0)? as i64;
            match chars.get(usize::try_from(i).ok().filter(|&i| (i as i64) < len).unwrap_or(usize::MAX)) {
                Some(c) => Value::str(c.to_string()),
                None => Value::str(""),
            }
        }
        StrCharCodeAt => {
            let i = num_arg(interp, 0, 0.0)? as i64;
            match usize::try_from(i).ok().and_then(|i| chars.get(i)) {
                Some(c) => Value::Num(f64::from(*c as u32)),
                None => Value::Num(f64::NAN),
            }
        }
        StrSlice => {
            let start = rel_index(num_arg(interp, 0, 0.0)?);
            let end = rel_index(num_arg(interp, 1, len as f64)?);
            if start < end {
                Value::str(chars[start..end].iter().collect::<String>())
            } else {
                Value::str("")
            }
        }
        StrSubstring => {
            let a = rel_index(num_arg(interp, 0, 0.0)?.max(0.0));
            let b2 = rel_index(num_arg(interp, 1, len as f64)?.max(0.0));
            let (start, end) = if a <= b2 { (a, b2) } else { (b2, a) };
            Value::str(chars[start..end].iter().collect::<String>())
        }
        StrIndexOf => {
            let needle = str_arg(interp, 0);
            match s.find(&needle) {
                Some(byte_pos) => Value::Num(s[..byte_pos].chars().count() as f64),
                None => Value::Num(-1.0),
            }
        }
        StrIncludes => {
            let needle = str_arg(interp, 0);
            Value::Bool(s.contains(&needle))
        }
        StrSplit => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::str(s)],
                Some(sep) => {
                    let sep = sep.to_display(interp.heap, interp.interner);
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::str(c.to_string())).collect()
                    } else {
                        s.split(&sep).map(Value::str).collect()
                    }
                }
            };
            Value::Ref(interp.heap.alloc_array(parts))
        }
        StrTrim => Value::str(s.trim()),
        StrToUpperCase => Value::str(s.to_uppercase()),
        StrToLowerCase => Value::str(s.to_lowercase()),
        StrStartsWith => {
            let needle = str_arg(interp, 0);
            Value::Bool(s.starts_with(&needle))
        }
        StrEndsWith => {
            let needle = str_arg(interp, 0);
            Value::Bool(s.ends_with(&needle))
        }
        StrRepeat => {
            let n = num_arg(interp, 0, 0.0)?;
            if n < 0.0 || !n.is_finite() {
                return Err(RunError::range_error("Invalid count value"));
            }
            Value::str(s.repeat(n as usize))
        }
        StrReplace => {
            // First-occurrence replacement with string arguments.
            let pattern = str_arg(interp, 0);
            let replacement = str_arg(interp, 1);
            Value::str(s.replacen(&pattern, &replacement, 1))
        }
        StrPadStart | StrPadEnd => {
            let target = num_arg(interp, 0, 0.0)? as usize;
            let pad = match args.get(1) {
                Some(Value::Undefined) | None => " ".to_owned(),
                Some(v) => v.to_display(interp.heap, interp.interner),
            };
            if chars.len() >= target || pad.is_empty() {
                Value::str(s)
            } else {
                let mut fill = String::new();
                while fill.chars().count() + chars.len() < target {
                    fill.push_str(&pad);
                }
                let need = target - chars.len();
                let fill: String = fill.chars().take(need).collect();
                if b == StrPadStart {
                    Value::str(format!("{fill}{s}"))
                } else {
                    Value::str(format!("{s}{fill}"))
                }
            }
        }
        StrConcat => {
            let mut out = s.to_owned();
            for i in 0..args.len() {
                out.push_str(&str_arg(interp, i));
            }
            Value::str(out)
        }
        _ => unreachable!("non-string builtin dispatched to strings"),
    };
    Ok(result)
}
