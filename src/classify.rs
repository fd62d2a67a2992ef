//! Type Classifier
//!
//! Maps the arguments of a `uniform(value, tag?)` call to a [`ParamKind`].
//! Resolution order:
//!
//! 1. explicit string tag (`"float"`, `"color"`, `"vec3"`, ...)
//! 2. constructor name of a `new` expression (`Color`, `Vector3`, `Matrix4`, ...)
//! 3. literal shape (number, boolean, member access as number)
//! 4. one level of indirection through a local binding's initializer
//!
//! Anything else is `None` and the declaration is left alone.

use oxc_ast::ast::{Argument, Expression};
use oxc_syntax::operator::UnaryOperator;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Boolean,
    Number,
    Color,
    Vector2,
    Vector3,
    Vector4,
    Matrix3,
    Matrix4,
    Texture,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Boolean => "boolean",
            ParamKind::Number => "number",
            ParamKind::Color => "color",
            ParamKind::Vector2 => "vector2",
            ParamKind::Vector3 => "vector3",
            ParamKind::Vector4 => "vector4",
            ParamKind::Matrix3 => "matrix3",
            ParamKind::Matrix4 => "matrix4",
            ParamKind::Texture => "texture",
        }
    }

    /// Component names for vector kinds, empty for everything else.
    pub fn axes(&self) -> &'static [&'static str] {
        match self {
            ParamKind::Vector2 => &["x", "y"],
            ParamKind::Vector3 => &["x", "y", "z"],
            ParamKind::Vector4 => &["x", "y", "z", "w"],
            _ => &[],
        }
    }

    pub fn is_vector(&self) -> bool {
        !self.axes().is_empty()
    }

    /// Matrices are recognised but have no control to bind to.
    pub fn has_control(&self) -> bool {
        !matches!(self, ParamKind::Matrix3 | ParamKind::Matrix4)
    }
}

/// Explicit tag table. Unknown tags yield `None`.
pub fn kind_from_tag(tag: &str) -> Option<ParamKind> {
    match tag.trim().to_ascii_lowercase().as_str() {
        "float" | "number" | "int" | "uint" => Some(ParamKind::Number),
        "bool" | "boolean" => Some(ParamKind::Boolean),
        "color" => Some(ParamKind::Color),
        "vec2" | "vector2" => Some(ParamKind::Vector2),
        "vec3" | "vector3" => Some(ParamKind::Vector3),
        "vec4" | "vector4" => Some(ParamKind::Vector4),
        "mat3" | "matrix3" => Some(ParamKind::Matrix3),
        "mat4" | "matrix4" => Some(ParamKind::Matrix4),
        _ => None,
    }
}

pub fn kind_from_constructor(name: &str) -> Option<ParamKind> {
    match name {
        "Color" => Some(ParamKind::Color),
        "Vector2" => Some(ParamKind::Vector2),
        "Vector3" => Some(ParamKind::Vector3),
        "Vector4" => Some(ParamKind::Vector4),
        "Matrix3" => Some(ParamKind::Matrix3),
        "Matrix4" => Some(ParamKind::Matrix4),
        _ => None,
    }
}

/// Strips parentheses and TypeScript-only wrappers.
pub fn unwrap_expression<'b, 'a>(mut expr: &'b Expression<'a>) -> &'b Expression<'a> {
    loop {
        expr = match expr {
            Expression::ParenthesizedExpression(p) => &p.expression,
            Expression::TSAsExpression(e) => &e.expression,
            Expression::TSSatisfiesExpression(e) => &e.expression,
            Expression::TSNonNullExpression(e) => &e.expression,
            _ => return expr,
        };
    }
}

/// Steps 2 and 3: classify a value from its own shape, no lookups.
pub fn classify_value(expr: &Expression) -> Option<ParamKind> {
    match unwrap_expression(expr) {
        Expression::NewExpression(new_expr) => {
            let class_name = match unwrap_expression(&new_expr.callee) {
                Expression::Identifier(id) => id.name.as_str(),
                Expression::StaticMemberExpression(member) => member.property.name.as_str(),
                _ => return None,
            };
            kind_from_constructor(class_name)
        }
        Expression::NumericLiteral(_) => Some(ParamKind::Number),
        Expression::BooleanLiteral(_) => Some(ParamKind::Boolean),
        Expression::UnaryExpression(unary)
            if unary.operator == UnaryOperator::UnaryNegation
                && matches!(
                    unwrap_expression(&unary.argument),
                    Expression::NumericLiteral(_)
                ) =>
        {
            Some(ParamKind::Number)
        }
        Expression::StaticMemberExpression(_)
        | Expression::ComputedMemberExpression(_)
        | Expression::PrivateFieldExpression(_) => Some(ParamKind::Number),
        _ => None,
    }
}

/// Classifies the arguments of a parameter constructor call.
///
/// `resolve` returns the shape-only classification of the initializer of the
/// binding an identifier refers to, which is what makes the indirection step
/// stop after one hop: an identifier initializer was never classified in the
/// first place.
pub fn classify_arguments(
    arguments: &[Argument],
    resolve: impl Fn(&str) -> Option<ParamKind>,
) -> Option<ParamKind> {
    let value = arguments.first().and_then(|a| a.as_expression())?;
    let tag = arguments.get(1).and_then(|a| a.as_expression());

    if let Some(tag) = tag {
        if let Expression::StringLiteral(lit) = unwrap_expression(tag) {
            let kind = kind_from_tag(lit.value.as_str());
            if kind.is_none() {
                log::warn!(
                    "[tsl-uniform-gui] unknown uniform type tag \"{}\"",
                    lit.value
                );
            }
            return kind;
        }
    }

    if let Some(kind) = classify_value(value) {
        return Some(kind);
    }

    if let Expression::Identifier(id) = unwrap_expression(value) {
        return resolve(id.name.as_str());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_table() {
        assert_eq!(kind_from_tag("float"), Some(ParamKind::Number));
        assert_eq!(kind_from_tag("bool"), Some(ParamKind::Boolean));
        assert_eq!(kind_from_tag("Color"), Some(ParamKind::Color));
        assert_eq!(kind_from_tag("vec2"), Some(ParamKind::Vector2));
        assert_eq!(kind_from_tag("vec3"), Some(ParamKind::Vector3));
        assert_eq!(kind_from_tag("vec4"), Some(ParamKind::Vector4));
        assert_eq!(kind_from_tag("mat4"), Some(ParamKind::Matrix4));
        assert_eq!(kind_from_tag("sampler2D"), None);
    }

    #[test]
    fn test_constructor_table() {
        assert_eq!(kind_from_constructor("Vector3"), Some(ParamKind::Vector3));
        assert_eq!(kind_from_constructor("Matrix3"), Some(ParamKind::Matrix3));
        assert_eq!(kind_from_constructor("Mesh"), None);
    }

    #[test]
    fn test_axes_and_controls() {
        assert_eq!(ParamKind::Vector4.axes(), &["x", "y", "z", "w"]);
        assert!(ParamKind::Vector2.is_vector());
        assert!(!ParamKind::Color.is_vector());
        assert!(!ParamKind::Matrix4.has_control());
        assert!(ParamKind::Texture.has_control());
    }
}
