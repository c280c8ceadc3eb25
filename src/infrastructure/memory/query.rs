//! Row-query evaluation for the in-memory tables.

use crate::application::ports::remote_gateway::{compare_text, value_as_text};
use crate::application::ports::{Row, RowQuery};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// `alias:table!fk(*)` joins named in a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub alias: String,
    pub table: String,
    pub foreign_key: String,
}

pub fn parse_embeds(select: &str) -> Vec<Embed> {
    select
        .split(',')
        .map(str::trim)
        .filter_map(|part| {
            let (alias, rest) = part.split_once(':')?;
            let (table, rest) = rest.split_once('!')?;
            let foreign_key = rest.split_once('(')?.0;
            Some(Embed {
                alias: alias.trim().to_string(),
                table: table.trim().to_string(),
                foreign_key: foreign_key.trim().to_string(),
            })
        })
        .collect()
}

fn compare_rows(left: &Row, right: &Row, column: &str) -> Ordering {
    let l = left.get(column).and_then(value_as_text);
    let r = right.get(column).and_then(value_as_text);
    match (l, r) {
        (Some(l), Some(r)) => compare_text(&l, &r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn evaluate(tables: &HashMap<String, Vec<Row>>, query: &RowQuery) -> Vec<Row> {
    let Some(rows) = tables.get(&query.table) else {
        return Vec::new();
    };
    let mut selected: Vec<Row> = rows
        .iter()
        .filter(|row| query.filters.iter().all(|filter| filter.matches(row)))
        .cloned()
        .collect();

    selected.sort_by(|a, b| {
        query
            .order
            .iter()
            .map(|order| {
                let ordering = compare_rows(a, b, &order.column);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    if let Some(limit) = query.limit {
        selected.truncate(limit);
    }

    if let Some(select) = &query.select {
        let embeds = parse_embeds(select);
        for row in &mut selected {
            for embed in &embeds {
                let joined = row
                    .get(&embed.foreign_key)
                    .and_then(value_as_text)
                    .and_then(|key| {
                        tables.get(&embed.table).and_then(|target| {
                            target
                                .iter()
                                .find(|candidate| {
                                    candidate.get("id").and_then(value_as_text).as_deref()
                                        == Some(key.as_str())
                                })
                                .cloned()
                        })
                    });
                row.insert(
                    embed.alias.clone(),
                    joined.map(Value::Object).unwrap_or(Value::Null),
                );
            }
        }
    }
    selected
}
