//! Template compiler: turns a JSON template into a [`Query`].
//!
//! Every object key is parsed as a key specifier followed by a context
//! modifier chain, and every string value as a value expression (or a
//! condition for `#if`). The value is then placed at the end of the chain.

use crate::ast::{Expr, Key, ObjectTemplate, Order, Template};
use crate::parser::{NodeIds, ParseError, Parser, Result};
use crate::value::Value;

/// A compiled template. Immutable; every run creates its own data objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub root: Template,
}

pub fn compile(template: &Value) -> Result<Query> {
    let mut ids = NodeIds::new();
    let root = to_template(template, &mut ids)?;
    log::debug!("compiled template, {} shared/aggregate/call nodes", ids.count());
    Ok(Query { root })
}

fn to_template(value: &Value, ids: &mut NodeIds) -> Result<Template> {
    match value {
        Value::Array(items) => Ok(Template::Array(
            items
                .iter()
                .map(|item| to_template(item, ids))
                .collect::<Result<Vec<_>>>()?,
        )),
        Value::Object(members) => {
            let mut object = ObjectTemplate::default();
            for (name, member) in members {
                add_field(&mut object, name, member, ids)?;
            }
            Ok(Template::Object(object))
        }
        Value::String(text) => {
            let mut parser = Parser::new(text, ids);
            let Some(parsed) = parser.value()? else {
                return Err(parser.error("Empty expression"));
            };
            Ok(match parsed.cond {
                Some(cond) => Template::WithCond {
                    inner: Box::new(parsed.value),
                    cond,
                },
                None => parsed.value,
            })
        }
        Value::Integer(i) => Ok(constant(Expr::Int(*i))),
        Value::Float(f) => Ok(constant(Expr::Float(*f))),
        Value::Boolean(b) => Ok(constant(Expr::Bool(*b))),
        Value::Null => Err(ParseError {
            position: 0,
            message: "null is not a valid template value".to_string(),
            marked: "/*error*/null".to_string(),
        }),
    }
}

fn constant(expr: Expr) -> Template {
    Template::Value {
        expr,
        order: Order::None,
        order_num: 0,
    }
}

fn add_field(object: &mut ObjectTemplate, name: &str, member: &Value, ids: &mut NodeIds) -> Result<()> {
    let mut key_parser = Parser::new(name, ids);
    let key = key_parser.key()?;
    let context = key_parser.key_context(&key)?;
    let place = |template: Template, collect: bool| -> Template {
        let template = if collect && context.collects && !template.is_array() {
            Template::Array(vec![template])
        } else {
            template
        };
        match &context.modifier {
            Some(modifier) => modifier.replace(&template),
            None => template,
        }
    };

    let Value::String(text) = member else {
        let value = to_template(member, ids)?;
        object.add(key, Some(place(value, true)), None);
        return Ok(());
    };

    let mut parser = Parser::new(text, ids);
    if key == Key::Cond {
        let cond = parser.full_condition()?;
        object.add(key, None, Some(place(Template::CondWrapper(cond), false)));
        return Ok(());
    }
    let Some(parsed) = parser.value()? else {
        return Err(parser.error(format!("Empty value for key \"{}\"", name)));
    };
    let value = match parsed.cond {
        Some(cond) => Template::WithCond {
            inner: Box::new(parsed.value),
            cond,
        },
        None => parsed.value,
    };
    object.add(key, Some(place(value, true)), None);
    Ok(())
}
