//! Elasticsearch date-math expressions rendered as Kusto scalar
//! expressions.
//!
//! Grammar: an anchor (`now` or a literal date, the latter separated from
//! any math by `||`), zero or more `(+|-)(count)(unit)` offsets, and an
//! optional trailing `/unit` rounding. Units: y M w d h H m s.

use crate::error::Error;
use nom::character::complete::{anychar, digit0, one_of};

type NomErr<'a> = nom::error::Error<&'a str>;

/// Translate a date-math string into a Kusto datetime expression.
pub fn to_kusto_expr(input: &str) -> Result<String, Error> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::Parse("empty date math expression".to_string()));
    }

    let (anchor, math) = if let Some(rest) = input.strip_prefix("now") {
        ("now()".to_string(), rest)
    } else if let Some((literal, rest)) = input.split_once("||") {
        (format!("make_datetime({literal})"), rest)
    } else {
        (format!("make_datetime({input})"), "")
    };

    apply_math(anchor, math)
}

fn apply_math(mut expr: String, mut rest: &str) -> Result<String, Error> {
    loop {
        if rest.is_empty() {
            return Ok(expr);
        }
        if let Some(unit_part) = rest.strip_prefix('/') {
            let mut chars = unit_part.chars();
            let unit = chars
                .next()
                .ok_or_else(|| Error::Parse("missing rounding unit".to_string()))?;
            if chars.next().is_some() {
                return Err(Error::Parse(format!(
                    "trailing input after rounding unit: {unit_part}"
                )));
            }
            return round(expr, unit);
        }

        let (after_sign, sign) = one_of::<_, _, NomErr>("+-")(rest)
            .map_err(|_| Error::Parse(format!("expected date math offset at: {rest}")))?;
        let (after_count, count) = digit0::<_, NomErr>(after_sign)
            .map_err(|_| Error::Parse(format!("bad offset count at: {after_sign}")))?;
        let (after_unit, unit) = anychar::<_, NomErr>(after_count)
            .map_err(|_| Error::Parse("missing offset unit".to_string()))?;

        // ES allows omitting the count ("now+y" means one year)
        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| Error::Parse(format!("bad offset count: {count}")))?
        };
        let amount = if sign == '-' { -count } else { count };

        expr = format!("datetime_add('{}', {}, {})", unit_name(unit)?, amount, expr);
        rest = after_unit;
    }
}

fn unit_name(unit: char) -> Result<&'static str, Error> {
    match unit {
        'y' => Ok("year"),
        'M' => Ok("month"),
        'w' => Ok("week"),
        'd' => Ok("day"),
        'h' | 'H' => Ok("hour"),
        'm' => Ok("minute"),
        's' => Ok("second"),
        other => Err(Error::InvalidDateMathUnit(other)),
    }
}

fn round(expr: String, unit: char) -> Result<String, Error> {
    match unit {
        'y' => Ok(format!("startofyear({expr})")),
        'M' => Ok(format!("startofmonth({expr})")),
        'w' => Ok(format!("startofweek({expr})")),
        'd' => Ok(format!("startofday({expr})")),
        'h' | 'H' => Ok(format!("bin({expr}, 1h)")),
        'm' => Ok(format!("bin({expr}, 1m)")),
        's' => Ok(format!("bin({expr}, 1s)")),
        other => Err(Error::InvalidDateMathUnit(other)),
    }
}
