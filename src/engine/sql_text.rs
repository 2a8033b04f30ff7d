// SPDX-License-Identifier: Apache-2.0

//! SQL text rendering
//!
//! Turns typed fields into T-SQL literals and WHERE/SET/VALUES fragments.
//! Every function here is pure apart from [`inject_variable`] and
//! [`prepare_fields_for_child`], which set a field's expression override.

use chrono::NaiveDateTime;

use crate::engine::record::{Field, Record};
use crate::engine::types::{ForeignKeyEdge, Value, ValueKind};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// SQL Server uses square brackets for identifier quoting.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Doubles embedded single quotes.
pub fn escape_text(value: &str) -> String {
    value.replace('\'', "''")
}

fn quoted(value: &str) -> String {
    format!("'{}'", escape_text(value))
}

/// Renders a field as a SQL literal.
///
/// An expression override is returned verbatim; otherwise rendering follows
/// the column's logical type. Binary columns are not round-tripped and
/// always render as `''`.
pub fn value_to_sql_text(field: &Field) -> String {
    if let Some(expression) = field.expression() {
        return expression.to_string();
    }

    let meta = field.metadata();
    let value = field.value();

    if meta.kind == ValueKind::String {
        return string_literal(field);
    }
    if meta.kind == ValueKind::Binary {
        return "''".to_string();
    }
    if value.is_null() {
        return "NULL".to_string();
    }

    match meta.kind {
        ValueKind::Boolean => {
            let truthy = match value {
                Value::Bool(b) => *b,
                Value::Int(i) => *i != 0,
                Value::Text(s) => s.eq_ignore_ascii_case("true") || s.trim() == "1",
                _ => false,
            };
            let bit = if truthy { "1" } else { "0" };
            bit.to_string()
        }
        ValueKind::DateTime => match value {
            Value::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMAT)),
            other => quoted(&other.to_string()),
        },
        ValueKind::TimeSpan => match value {
            Value::Time(offset) => NaiveDateTime::default()
                .checked_add_signed(*offset)
                .map(|t| format!("'{}'", t.format(TIME_FORMAT)))
                .unwrap_or_else(|| quoted(&offset.to_string())),
            other => quoted(&other.to_string()),
        },
        ValueKind::Number => match value {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.to_string(),
            other => escape_text(&other.to_string()),
        },
        _ => escape_text(&value.to_string()),
    }
}

/// NULL only stands for an absent value; a populated empty string stays `''`.
fn string_literal(field: &Field) -> String {
    let meta = field.metadata();
    match field.value() {
        Value::Null if meta.is_nullable => "NULL".to_string(),
        Value::Null => "''".to_string(),
        value => {
            let text = value.to_string();
            let prefix = if !text.is_empty() && meta.base_type() == "nvarchar" {
                "N"
            } else {
                ""
            };
            format!("{}{}", prefix, quoted(&text))
        }
    }
}

/// Fields of a record that belong in INSERT/UPDATE statements
pub fn not_identity_fields(record: &Record) -> Vec<&Field> {
    record.not_identity_fields()
}

/// Points the named field at a SQL variable; no-op when the field is absent.
pub fn inject_variable<'a>(
    mut fields: Vec<&'a mut Field>,
    variable_ref: &str,
    field_name: &str,
) -> Vec<&'a mut Field> {
    if let Some(field) = fields.iter_mut().find(|f| f.is_named(field_name)) {
        field.set_expression(variable_ref);
    }
    fields
}

/// Substitutes the parent's variable into the child's foreign-key column.
///
/// A self-referencing edge on a table scripted with explicit identity values
/// is left alone: the key is already known and the variable would not be
/// initialized yet. In that case all fields are returned.
pub fn prepare_fields_for_child<'a>(
    child: &'a mut Record,
    parent_variable: &str,
    edge: &ForeignKeyEdge,
) -> Vec<&'a Field> {
    let table = child.table_name().to_string();
    let self_reference = edge.is_parent(&table) && edge.is_referenced(&table);

    if self_reference && child.sql_build_strategy().identity_insert {
        return child.fields().iter().collect();
    }

    let column = if edge.is_parent(&table) {
        edge.parent_column.clone()
    } else {
        edge.referenced_column.clone()
    };

    inject_variable(child.not_identity_fields_mut(), parent_variable, &column)
        .into_iter()
        .map(shared)
        .collect()
}

fn shared(field: &mut Field) -> &Field {
    field
}

/// Joins `[name] = value` pairs, skipping fields whose literal renders empty.
pub fn join_name_value<F>(fields: &[&Field], separator: &str, value_fn: F) -> String
where
    F: Fn(&Field) -> String,
{
    join_pairs(fields, separator, |f| {
        format!("{} = {}", quote_ident(f.name()), value_fn(f))
    })
}

fn join_pairs<F>(fields: &[&Field], separator: &str, pair_fn: F) -> String
where
    F: Fn(&Field) -> String,
{
    fields
        .iter()
        .filter(|f| !value_to_sql_text(f).trim().is_empty())
        .map(|f| pair_fn(f))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Predicate over `fields`; a NULL literal compares with `IS NULL`.
pub fn where_clause(fields: &[&Field]) -> String {
    join_pairs(fields, " AND ", |f| {
        let literal = value_to_sql_text(f);
        if literal == "NULL" {
            format!("{} IS NULL", quote_ident(f.name()))
        } else {
            format!("{} = {}", quote_ident(f.name()), literal)
        }
    })
}

pub fn update_set_clause(fields: &[&Field]) -> String {
    join_name_value(fields, ", ", value_to_sql_text)
}

/// `[name] = raw` pairs separated by a space, for diagnostics
pub fn plain_name_value(fields: &[&Field]) -> String {
    join_name_value(fields, " ", |f| escape_text(&f.value().to_string()))
}

/// Insert guarded by an existence check on the record's unique fields.
pub fn idempotent_insert_fragment(record: &Record) -> String {
    let fields = record.not_identity_fields();
    let columns = fields
        .iter()
        .map(|f| quote_ident(f.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let values = fields
        .iter()
        .map(|f| value_to_sql_text(f))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "IF NOT EXISTS (SELECT TOP 1 1 FROM {table} WHERE {unique}) INSERT INTO {table} ({columns}) VALUES ({values})",
        table = record.table_name(),
        unique = record.unique_where(),
        columns = columns,
        values = values,
    )
}
