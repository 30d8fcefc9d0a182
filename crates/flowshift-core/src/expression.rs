use std::fmt;

use crate::error::InstanceViolation;

/// Resolves event trigger expressions (message and signal names) against
/// instance variables when a trigger is armed or updated by migration.
pub trait ExpressionResolver: Send + Sync + fmt::Debug {
    fn resolve(
        &self,
        expression: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<String, InstanceViolation>;
}

/// Substitutes `${name}` placeholders with the text of the named variable.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderResolver;

impl ExpressionResolver for PlaceholderResolver {
    fn resolve(
        &self,
        expression: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<String, InstanceViolation> {
        let mut out = String::with_capacity(expression.len());
        let mut rest = expression;
        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start + 2..].find('}') else {
                break;
            };
            let name = rest[start + 2..start + 2 + len].trim();
            let value = lookup(name).ok_or_else(|| InstanceViolation::UnresolvableExpression {
                expression: expression.to_string(),
                variable: name.to_string(),
            })?;
            out.push_str(&rest[..start]);
            out.push_str(&value);
            rest = &rest[start + 2 + len + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        (name == "var").then(|| "foo".to_string())
    }

    #[test]
    fn substitutes_placeholders() {
        assert_eq!(
            PlaceholderResolver.resolve("new${var}Message", &lookup),
            Ok("newfooMessage".to_string())
        );
        assert_eq!(
            PlaceholderResolver.resolve("Message", &lookup),
            Ok("Message".to_string())
        );
    }

    #[test]
    fn unknown_variable_is_reported() {
        assert_eq!(
            PlaceholderResolver.resolve("msg-${missing}", &lookup),
            Err(InstanceViolation::UnresolvableExpression {
                expression: "msg-${missing}".into(),
                variable: "missing".into(),
            })
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(
            PlaceholderResolver.resolve("a${b", &lookup),
            Ok("a${b".to_string())
        );
    }
}
