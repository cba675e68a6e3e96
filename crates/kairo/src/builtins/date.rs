//! The `Date` global.
//!
//! All construction and accessors are UTC-based; the engine does not consult
//! the host time zone.

use chrono::{Datelike, TimeZone, Timelike, Utc};

use crate::{
    eval::Interp,
    exception::RunResult,
    heap::{HeapData, HeapId},
    value::Value,
};

use super::Builtin;

pub(crate) fn method(name: &str) -> Option<Builtin> {
    use Builtin::*;
    Some(match name {
        "getTime" | "valueOf" => DateGetTime,
        "toISOString" | "toJSON" => DateToIsoString,
        "getUTCFullYear" => DateGetUtcFullYear,
        "getUTCMonth" => DateGetUtcMonth,
        "getUTCDate" => DateGetUtcDate,
        "getUTCHours" => DateGetUtcHours,
        "getUTCMinutes" => DateGetUtcMinutes,
        "getUTCSeconds" => DateGetUtcSeconds,
        "getUTCMilliseconds" => DateGetUtcMilliseconds,
        "getUTCDay" => DateGetUtcDay,
        _ => return None,
    })
}

fn now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// `new Date()`, `new Date(ms)`, `new Date(y, m, d?, h?, min?, s?, ms?)`.
pub(crate) fn construct(interp: &mut Interp, args: &[Value]) -> RunResult<Value> {
    let ms = match args.len() {
        0 => now_ms(),
        1 => match &args[0] {
            Value::Str(s) => parse_date(s),
            other => other.to_number(interp.heap)?,
        },
        _ => {
            let mut parts = [0.0f64; 7];
            for (i, slot) in parts.iter_mut().enumerate() {
                *slot = match args.get(i) {
                    Some(v) => v.to_number(interp.heap)?,
                    None => 0.0,
                };
            }
            // Day defaults to 1, everything after defaults to 0.
            let day = if args.len() > 2 { parts[2] } else { 1.0 };
            Utc.with_ymd_and_hms(
                parts[0] as i32,
                (parts[1] as u32).saturating_add(1).min(12).max(1),
                (day as u32).clamp(1, 31),
                (parts[3] as u32).min(23),
                (parts[4] as u32).min(59),
                (parts[5] as u32).min(59),
            )
            .single()
            .map_or(f64::NAN, |dt| dt.timestamp_millis() as f64 + parts[6])
        }
    };
    Ok(Value::Ref(interp.heap.alloc(HeapData::Date(ms))))
}

fn parse_date(s: &str) -> f64 {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis() as f64)
        .unwrap_or(f64::NAN)
}

fn expect_date(interp: &Interp, this: &Value) -> Option<f64> {
    match this {
        Value::Ref(id) => match interp.heap.get(*id) {
            HeapData::Date(ms) => Some(*ms),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn call(interp: &mut Interp, b: Builtin, this: &Value, _args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    if b == DateNow {
        return Ok(Value::Num(now_ms()));
    }
    let Some(ms) = expect_date(interp, this) else {
        return Err(crate::exception::RunError::type_error(
            "Date method called on a non-Date receiver",
        ));
    };
    if b == DateGetTime {
        return Ok(Value::Num(ms));
    }
    if b == DateToIsoString {
        return Ok(Value::str(to_iso_string(ms)));
    }
    let Some(dt) = Utc.timestamp_millis_opt(ms as i64).single() else {
        return Ok(Value::Num(f64::NAN));
    };
    let v = match b {
        DateGetUtcFullYear => f64::from(dt.year()),
        DateGetUtcMonth => f64::from(dt.month0()),
        DateGetUtcDate => f64::from(dt.day()),
        DateGetUtcHours => f64::from(dt.hour()),
        DateGetUtcMinutes => f64::from(dt.minute()),
        DateGetUtcSeconds => f64::from(dt.second()),
        DateGetUtcMilliseconds => f64::from(dt.timestamp_subsec_millis()),
        DateGetUtcDay => f64::from(dt.weekday().num_days_from_sunday()),
        _ => unreachable!("non-date builtin dispatched to date"),
    };
    Ok(Value::Num(v))
}

/// ISO-8601 UTC rendering used by `toISOString` and display.
pub(crate) fn to_iso_string(ms: f64) -> String {
    match Utc.timestamp_millis_opt(ms as i64).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => "Invalid Date".to_owned(),
    }
}
