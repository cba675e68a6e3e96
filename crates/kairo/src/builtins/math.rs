//! The `Math` namespace.

use crate::{
    eval::Interp,
    exception::RunResult,
    heap::{Heap, PropKey},
    value::Value,
};

use super::Builtin;

/// Builds the `Math` namespace object.
pub(crate) fn make_namespace(heap: &mut Heap) -> Value {
    use Builtin::*;
    let id = heap.alloc_object(None);
    let obj = heap.expect_object_mut(id);
    let entries: &[(&str, Builtin)] = &[
        ("floor", MathFloor),
        ("ceil", MathCeil),
        ("round", MathRound),
        ("trunc", MathTrunc),
        ("abs", MathAbs),
        ("sign", MathSign),
        ("min", MathMin),
        ("max", MathMax),
        ("pow", MathPow),
        ("sqrt", MathSqrt),
        ("random", MathRandom),
        ("log", MathLog),
        ("exp", MathExp),
        ("sin", MathSin),
        ("cos", MathCos),
        ("tan", MathTan),
        ("atan2", MathAtan2),
        ("hypot", MathHypot),
    ];
    for (name, b) in entries {
        obj.insert(PropKey::Str((*name).into()), Value::Builtin(*b));
    }
    obj.insert(PropKey::Str("PI".into()), Value::Num(std::f64::consts::PI));
    obj.insert(PropKey::Str("E".into()), Value::Num(std::f64::consts::E));
    obj.insert(PropKey::Str("LN2".into()), Value::Num(std::f64::consts::LN_2));
    obj.insert(PropKey::Str("LN10".into()), Value::Num(std::f64::consts::LN_10));
    obj.insert(PropKey::Str("SQRT2".into()), Value::Num(std::f64::consts::SQRT_2));
    Value::Ref(id)
}

pub(crate) fn call(interp: &mut Interp, b: Builtin, args: &[Value]) -> RunResult<Value> {
    use Builtin::*;
    let arg = |i: usize| -> RunResult<f64> {
        args.get(i)
            .cloned()
            .unwrap_or(Value::Undefined)
            .to_number(interp.heap)
    };
    let v = match b {
        MathFloor => arg(0)?.floor(),
        MathCeil => arg(0)?.ceil(),
        // Round follows script semantics: ties go toward positive infinity.
        MathRound => {
            let n = arg(0)?;
            (n + 0.5).floor()
        }
        MathTrunc => arg(0)?.trunc(),
        MathAbs => arg(0)?.abs(),
        MathSign => {
            let n = arg(0)?;
            if n.is_nan() || n == 0.0 { n } else { n.signum() }
        }
        MathMin => {
            let mut best = f64::INFINITY;
            for i in 0..args.len() {
                let n = arg(i)?;
                if n.is_nan() {
                    best = f64::NAN;
                    break;
                }
                if n < best {
                    best = n;
                }
            }
            best
        }
        MathMax => {
            let mut best = f64::NEG_INFINITY;
            for i in 0..args.len() {
                let n = arg(i)?;
                if n.is_nan() {
                    best = f64::NAN;
                    break;
                }
                if n > best {
                    best = n;
                }
            }
            best
        }
        MathPow => arg(0)?.powf(arg(1)?),
        MathSqrt => arg(0)?.sqrt(),
        MathRandom => pseudo_random(),
        MathLog => arg(0)?.ln(),
        MathExp => arg(0)?.exp(),
        MathSin => arg(0)?.sin(),
        MathCos => arg(0)?.cos(),
        MathTan => arg(0)?.tan(),
        MathAtan2 => arg(0)?.atan2(arg(1)?),
        MathHypot => {
            let mut sum = 0.0f64;
            for i in 0..args.len() {
                let n = arg(i)?;
                sum += n * n;
            }
            sum.sqrt()
        }
        _ => unreachable!("non-math builtin dispatched to math"),
    };
    Ok(Value::Num(v))
}

/// A small xorshift over the current time. The engine carries no RNG state;
/// Math.random needs no reproducibility guarantees here.
fn pseudo_random() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ (d.as_secs() << 16))
        .unwrap_or(0x9e37_79b9);
    let mut x = nanos | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    (x % (1 << 53)) as f64 / (1u64 << 53) as f64
}
