//! The `RegExp` contract: literals, `test`, and `exec`.
//!
//! Patterns compile lazily through the `regex` crate, translating the small
//! flag set the engine accepts (`i`, `g`, `m`, `s`); an unsupported pattern
//! raises a SyntaxError only when first exercised.

use std::rc::Rc;

use crate::{
    eval::Interp,
    exception::{RunError, RunResult},
    heap::{Heap, HeapData, HeapId, JsRegex, PropKey},
    value::{JsStr, Value},
};

use super::Builtin;

pub(crate) fn alloc_regex(heap: &mut Heap, pattern: JsStr, flags: JsStr) -> Value {
    Value::Ref(heap.alloc(HeapData::Regex(JsRegex {
        source: pattern,
        flags,
        compiled: None,
        last_index: 0,
    })))
}

pub(crate) fn construct(interp: &mut Interp, args: &[Value]) -> RunResult<Value> {
    let pattern: JsStr = match args.first() {
        Some(Value::Str(s)) => s.clone(),
        Some(Value::Ref(id)) => match interp.heap.get(*id) {
            HeapData::Regex(r) => r.source.clone(),
            _ => "".into(),
        },
        _ => "".into(),
    };
    let flags: JsStr = match args.get(1) {
        Some(Value::Str(s)) => s.clone(),
        _ => "".into(),
    };
    Ok(alloc_regex(interp.heap, pattern, flags))
}

/// Compiles (or fetches the cached) regex for a heap slot.
fn compiled(interp: &mut Interp, id: HeapId) -> RunResult<Rc<regex::Regex>> {
    let HeapData::Regex(r) = interp.heap.get(id) else {
        return Err(RunError::type_error("Receiver is not a RegExp"));
    };
    if let Some(compiled) = &r.compiled {
        return Ok(compiled.clone());
    }
    let mut pattern = r.source.to_string();
    let flags = r.flags.clone();
    let mut prefix = String::new();
    for flag in flags.chars() {
        match flag {
            'i' => prefix.push('i'),
            'm' => prefix.push('m'),
            's' => prefix.push('s'),
            // Global affects lastIndex handling, not the pattern.
            'g' | 'u' | 'y' => {}
            other => {
                return Err(RunError::syntax_error(format!("Invalid regular expression flag '{other}'")));
            }
        }
    }
    if !prefix.is_empty() {
        pattern = format!("(?{prefix}){pattern}");
    }
    let compiled = regex::Regex::new(&pattern)
        .map_err(|e| RunError::syntax_error(format!("Invalid regular expression: {e}")))?;
    let compiled = Rc::new(compiled);
    if let HeapData::Regex(r) = interp.heap.get_mut(id) {
        r.compiled = Some(compiled.clone());
    }
    Ok(compiled)
}

pub(crate) fn call(interp: &mut Interp, b: Builtin, this: &Value, args: &[Value]) -> RunResult<Value> {
    let Value::Ref(id) = this else {
        return Err(RunError::type_error("Receiver is not a RegExp"));
    };
    let regex = compiled(interp, *id)?;
    let input = args
        .first()
        .map(|v| v.to_display(interp.heap, interp.interner))
        .unwrap_or_default();

    let (global, start) = match interp.heap.get(*id) {
        HeapData::Regex(r) => (r.flags.contains('g'), r.last_index as usize),
        _ => (false, 0),
    };
    let search_from = if global { start.min(input.len()) } else { 0 };

    match b {
        Builtin::RegexTest => {
            let found = regex.find(&input[search_from..]);
            if global && let HeapData::Regex(r) = interp.heap.get_mut(*id) {
                r.last_index = match &found {
                    Some(m) => (search_from + m.end()) as u32,
                    None => 0,
                };
            }
            Ok(Value::Bool(found.is_some()))
        }
        Builtin::RegexExec => {
            let captures = regex.captures(&input[search_from..]);
            let Some(captures) = captures else {
                if global && let HeapData::Regex(r) = interp.heap.get_mut(*id) {
                    r.last_index = 0;
                }
                return Ok(Value::Null);
            };
            let full = captures.get(0).expect("capture 0 always present");
            if global && let HeapData::Regex(r) = interp.heap.get_mut(*id) {
                r.last_index = (search_from + full.end()) as u32;
            }
            let groups: Vec<Value> = (0..captures.len())
                .map(|i| match captures.get(i) {
                    Some(m) => Value::str(m.as_str()),
                    None => Value::Undefined,
                })
                .collect();
            let arr = interp.heap.alloc_array(groups);
            if let HeapData::Array(a) = interp.heap.get_mut(arr) {
                a.extra.insert(
                    PropKey::Str("index".into()),
                    crate::heap::Property::Value(Value::Num((search_from + full.start()) as f64)),
                );
                a.extra.insert(
                    PropKey::Str("input".into()),
                    crate::heap::Property::Value(Value::str(input)),
                );
            }
            Ok(Value::Ref(arr))
        }
        _ => unreachable!("non-regex builtin dispatched to regex"),
    }
}
