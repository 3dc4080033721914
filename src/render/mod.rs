//! Client-side statement rendering.
//!
//! [`render_statement`] produces the text logged for each executed statement when
//! statement logging is on: the SQL with each `$N` placeholder replaced by the
//! literal form of its parameter. [`check_placeholders`] is the arity check run
//! before every statement.
//! Rendering is deterministic and never sent to the server; the driver still binds
//! parameters itself. [`bind_named`] rewrites `:name` placeholders to positional
//! ones so named parameters can go through the same path.
//!
//! Placeholders inside quoted strings, quoted identifiers, comments and
//! dollar-quoted blocks are left alone.

use std::borrow::Cow;

mod scanner;

use scanner::{Placeholder, rewrite};

use crate::error::SqlPoolError;
use crate::types::RowValues;

/// Render `sql` with its positional parameters inlined as SQL literals.
///
/// # Errors
/// Returns [`SqlPoolError::ParameterError`] if a placeholder refers to a parameter
/// that was not supplied.
///
/// ```rust
/// use pg_pool_middleware::prelude::*;
///
/// let sql = render_statement(
///     "select * from t where name = $1 and id = $2",
///     &[RowValues::Text("o'neil".into()), RowValues::Int(7)],
/// )?;
/// assert_eq!(sql, "select * from t where name = 'o''neil' and id = 7");
/// # Ok::<(), SqlPoolError>(())
/// ```
pub fn render_statement<'s>(
    sql: &'s str,
    params: &[RowValues],
) -> Result<Cow<'s, str>, SqlPoolError> {
    rewrite(sql, |placeholder| match placeholder {
        Placeholder::Positional(number) => {
            let value = number
                .checked_sub(1)
                .and_then(|idx| params.get(idx))
                .ok_or_else(|| {
                    SqlPoolError::ParameterError(format!(
                        "placeholder ${number} has no parameter ({} supplied)",
                        params.len()
                    ))
                })?;
            Ok(Some(literal(value)))
        }
        Placeholder::Named(_) => Ok(None),
    })
}

/// Check that every `$N` placeholder in `sql` has a parameter.
///
/// # Errors
/// Returns [`SqlPoolError::ParameterError`] naming the first placeholder with no
/// parameter.
pub fn check_placeholders(sql: &str, params: &[RowValues]) -> Result<(), SqlPoolError> {
    rewrite(sql, |placeholder| match placeholder {
        Placeholder::Positional(number) if number == 0 || number > params.len() => {
            Err(SqlPoolError::ParameterError(format!(
                "placeholder ${number} has no parameter ({} supplied)",
                params.len()
            )))
        }
        Placeholder::Positional(_) | Placeholder::Named(_) => Ok(None),
    })
    .map(|_| ())
}

/// Rewrite `:name` placeholders to `$N` and order the values to match.
///
/// A name used several times maps to a single positional parameter.
///
/// # Errors
/// Returns [`SqlPoolError::ParameterError`] for a placeholder with no matching
/// parameter.
pub fn bind_named(
    sql: &str,
    params: &[(&str, RowValues)],
) -> Result<(String, Vec<RowValues>), SqlPoolError> {
    let mut order: Vec<&str> = Vec::new();
    let mut values = Vec::new();
    let rewritten = rewrite(sql, |placeholder| match placeholder {
        Placeholder::Named(name) => {
            let position = match order.iter().position(|seen| *seen == name) {
                Some(existing) => existing + 1,
                None => {
                    let (key, value) = params
                        .iter()
                        .find(|(key, _)| *key == name)
                        .ok_or_else(|| {
                            SqlPoolError::ParameterError(format!("missing named parameter :{name}"))
                        })?;
                    order.push(*key);
                    values.push(value.clone());
                    order.len()
                }
            };
            Ok(Some(format!("${position}")))
        }
        Placeholder::Positional(number) => Err(SqlPoolError::ParameterError(format!(
            "positional placeholder ${number} mixed with named parameters"
        ))),
    })?;
    Ok((rewritten.into_owned(), values))
}

/// The SQL literal form of a value.
#[must_use]
pub fn literal(value: &RowValues) -> String {
    match value {
        RowValues::Int(i) => i.to_string(),
        RowValues::Float(f) if f.is_nan() => "'NaN'::float8".to_string(),
        RowValues::Float(f) if f.is_infinite() && f.is_sign_positive() => {
            "'Infinity'::float8".to_string()
        }
        RowValues::Float(f) if f.is_infinite() => "'-Infinity'::float8".to_string(),
        RowValues::Float(f) => f.to_string(),
        RowValues::Text(s) => quote(s),
        RowValues::Bool(b) => b.to_string(),
        RowValues::Timestamp(ts) => {
            format!("{}::timestamp", quote(&ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        }
        RowValues::Null => "NULL".to_string(),
        RowValues::JSON(json) => quote(&json.to_string()),
        RowValues::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 14);
            hex.push_str("'\\x");
            for byte in bytes {
                hex.push_str(&format!("{byte:02x}"));
            }
            hex.push_str("'::bytea");
            hex
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn renders_positional_literals() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .unwrap();
        let sql = "insert into t values ($1, $2, $3, $4, $5, $6, $7)";
        let params = vec![
            RowValues::Int(-3),
            RowValues::Float(1.5),
            RowValues::Text("it's".into()),
            RowValues::Bool(true),
            RowValues::Null,
            RowValues::Timestamp(ts),
            RowValues::Blob(vec![0x0a, 0xff]),
        ];
        let rendered = render_statement(sql, &params).unwrap();
        assert_eq!(
            rendered,
            "insert into t values (-3, 1.5, 'it''s', true, NULL, \
             '2024-01-02T03:04:05'::timestamp, '\\x0aff'::bytea)"
        );
    }

    #[test]
    fn repeated_placeholder_renders_twice() {
        let rendered = render_statement("select $1, $1", &[RowValues::Int(9)]).unwrap();
        assert_eq!(rendered, "select 9, 9");
    }

    #[test]
    fn skips_literals_comments_and_dollar_quotes() {
        let sql = "select '$1', \"$1\", $1 -- $1\n/* $1 /* $1 */ */ $$ $1 $$ $fn$ $1 $fn$";
        let rendered = render_statement(sql, &[RowValues::Int(4)]).unwrap();
        assert_eq!(
            rendered,
            "select '$1', \"$1\", 4 -- $1\n/* $1 /* $1 */ */ $$ $1 $$ $fn$ $1 $fn$"
        );
    }

    #[test]
    fn statement_without_placeholders_is_borrowed() {
        let rendered = render_statement("select 1", &[]).unwrap();
        assert!(matches!(rendered, Cow::Borrowed(_)));
    }

    #[test]
    fn keeps_non_ascii_text() {
        let rendered =
            render_statement("select 'é', $1", &[RowValues::Text("ü".into())]).unwrap();
        assert_eq!(rendered, "select 'é', 'ü'");
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let err = render_statement("select $2", &[RowValues::Int(1)]).unwrap_err();
        assert!(matches!(err, SqlPoolError::ParameterError(_)));
        let err = render_statement("select $0", &[RowValues::Int(1)]).unwrap_err();
        assert!(matches!(err, SqlPoolError::ParameterError(_)));
    }

    #[test]
    fn escape_strings_hide_placeholders() {
        let sql = r"select E'it\'s $1 dollars', e'\\', $1, x'$1'";
        let rendered = render_statement(sql, &[RowValues::Int(2)]).unwrap();
        assert_eq!(rendered, r"select E'it\'s $1 dollars', e'\\', 2, x'$1'");
        assert!(check_placeholders(r"select E'it\'s $1 dollars'", &[]).is_ok());
        // an identifier ending in `e` does not open an escape string
        assert!(check_placeholders(r"select type'a\', $1", &[]).is_err());
    }

    #[test]
    fn placeholder_check_counts_parameters() {
        assert!(check_placeholders("select $1, $2", &[RowValues::Int(1), RowValues::Null]).is_ok());
        assert!(check_placeholders("select $2", &[RowValues::Int(1)]).is_err());
        assert!(check_placeholders("select $0", &[RowValues::Int(1)]).is_err());
        assert!(check_placeholders("select '$3' -- $4", &[]).is_ok());
    }

    #[test]
    fn json_and_special_floats() {
        assert_eq!(literal(&RowValues::JSON(json!({"a": 1}))), "'{\"a\":1}'");
        assert_eq!(literal(&RowValues::Float(f64::NAN)), "'NaN'::float8");
        assert_eq!(literal(&RowValues::Float(f64::NEG_INFINITY)), "'-Infinity'::float8");
    }

    #[test]
    fn binds_named_parameters() {
        let (sql, values) = bind_named(
            "update t set a = :a::int4 where id = :id or parent = :id and s = ':a'",
            &[("id", RowValues::Int(5)), ("a", RowValues::Text("7".into()))],
        )
        .unwrap();
        assert_eq!(
            sql,
            "update t set a = $1::int4 where id = $2 or parent = $2 and s = ':a'"
        );
        assert_eq!(values, vec![RowValues::Text("7".into()), RowValues::Int(5)]);
    }

    #[test]
    fn named_binding_rejects_unknown_and_positional() {
        assert!(bind_named("select :nope", &[]).is_err());
        assert!(bind_named("select $1", &[]).is_err());
    }
}
