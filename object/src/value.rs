use crate::objects::ObjRef;

/// A runtime value.
///
/// Copy-by-value. Object references compare by identity, which for strings
/// is content equality because every string is interned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    #[inline(always)]
    pub const fn is_nil(self) -> bool {
        matches!(self, Self::Nil)
    }

    /// `nil` and `false` are falsey, everything else is truthy.
    #[inline(always)]
    pub const fn is_falsey(self) -> bool {
        matches!(self, Self::Nil | Self::Bool(false))
    }

    #[inline(always)]
    pub const fn as_number(self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_obj(self) -> Option<ObjRef> {
        match self {
            Self::Obj(r) => Some(r),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Self::Obj(r)
    }
}

/// Format a number the way C's `%g` does: six significant digits, trailing
/// zeros trimmed, exponent form outside `[1e-4, 1e6)`.
pub fn format_number(n: f64) -> String {
    const PRECISION: i32 = 6;

    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Rounding to the target precision may bump the exponent (9.999995 -> 10),
    // so take it from the rounded scientific form.
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp) as usize;
        trim_fraction(&format!("{n:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsiness() {
        assert!(Value::Nil.is_falsey());
        assert!(Value::Bool(false).is_falsey());
        assert!(!Value::Bool(true).is_falsey());
        assert!(!Value::Number(0.0).is_falsey());
    }

    #[test]
    fn cross_kind_values_are_unequal() {
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_ne!(Value::Number(0.0), Value::Bool(false));
        assert_eq!(Value::Number(1.5), Value::Number(1.5));
    }

    #[test]
    fn integers_print_without_fraction() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-42.0), "-42");
        assert_eq!(format_number(100000.0), "100000");
    }

    #[test]
    fn fractions_use_six_significant_digits() {
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(3.14159265), "3.14159");
        assert_eq!(format_number(0.0001), "0.0001");
    }

    #[test]
    fn large_and_small_use_exponent_form() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1000000.0), "1e+06");
        assert_eq!(format_number(123456789.0), "1.23457e+08");
        assert_eq!(format_number(0.00001), "1e-05");
        assert_eq!(format_number(999999.7), "1e+06");
    }

    #[test]
    fn special_values() {
        assert_eq!(format_number(f64::NAN), "nan");
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(format_number(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_number(-0.0), "-0");
    }
}
