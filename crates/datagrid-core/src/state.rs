//! Per-request table state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::column::Column;
use crate::error::{GridError, Result};
use crate::query::SortDirection;

/// Resolved state of one table request. Immutable once handed to the adapter.
#[derive(Debug, Clone)]
pub struct TableState {
    columns: Arc<[Column]>,
    draw: u64,
    start: u64,
    length: i64,
    global_search: String,
    column_search: Vec<(usize, String)>,
    order_by: Vec<(usize, SortDirection)>,
}

impl TableState {
    pub fn new(columns: Arc<[Column]>) -> Self {
        Self {
            columns,
            draw: 0,
            start: 0,
            length: -1,
            global_search: String::new(),
            column_search: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Result<&Column> {
        self.columns.get(index).ok_or_else(|| {
            GridError::InvalidRequest(format!(
                "column index {index} out of range ({} columns)",
                self.columns.len()
            ))
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn draw(&self) -> u64 {
        self.draw
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Page length; zero or negative means no limit.
    pub fn length(&self) -> i64 {
        self.length
    }

    pub fn global_search(&self) -> &str {
        &self.global_search
    }

    /// `(column, term)` pairs in submission order.
    pub fn search_columns(&self) -> impl Iterator<Item = (&Column, &str)> + '_ {
        self.column_search
            .iter()
            .map(|(i, term)| (&self.columns[*i], term.as_str()))
    }

    /// `(column, direction)` pairs, primary key first.
    pub fn order_by(&self) -> impl Iterator<Item = (&Column, SortDirection)> + '_ {
        self.order_by
            .iter()
            .map(|(i, dir)| (&self.columns[*i], *dir))
    }

    pub fn set_draw(&mut self, draw: u64) -> &mut Self {
        self.draw = draw;
        self
    }

    pub fn set_start(&mut self, start: u64) -> &mut Self {
        self.start = start;
        self
    }

    pub fn set_length(&mut self, length: i64) -> &mut Self {
        self.length = length;
        self
    }

    pub fn set_global_search(&mut self, search: impl Into<String>) -> &mut Self {
        self.global_search = search.into();
        self
    }

    /// Set (or replace) the search term of one column.
    pub fn set_column_search(&mut self, index: usize, search: impl Into<String>) -> Result<&mut Self> {
        self.column(index)?;
        let search = search.into();
        match self.column_search.iter_mut().find(|(i, _)| *i == index) {
            Some((_, term)) => *term = search,
            None => self.column_search.push((index, search)),
        }
        Ok(self)
    }

    pub fn add_order(&mut self, index: usize, direction: SortDirection) -> Result<&mut Self> {
        self.column(index)?;
        self.order_by.push((index, direction));
        Ok(self)
    }

    pub fn clear_order(&mut self) -> &mut Self {
        self.order_by.clear();
        self
    }

    /// Build a state from submitted DataTables-style parameters.
    pub fn from_request(columns: Arc<[Column]>, request: &TableRequest) -> Result<Self> {
        let mut state = Self::new(columns);
        state
            .set_draw(request.draw)
            .set_start(request.start)
            .set_length(request.length)
            .set_global_search(request.search.value.trim());

        for order in &request.order {
            let dir = order.dir.parse::<SortDirection>()?;
            state.add_order(order.column, dir)?;
        }

        for (index, column) in request.columns.iter().enumerate() {
            let term = column.search.value.trim();
            if !term.is_empty() {
                state.set_column_search(index, term)?;
            }
        }

        Ok(state)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub regex: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParams {
    pub column: usize,
    #[serde(default = "default_dir")]
    pub dir: String,
}

fn default_dir() -> String {
    "asc".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnParams {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub search: SearchParams,
}

/// Request parameters as submitted by a DataTables client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRequest {
    #[serde(default)]
    pub draw: u64,
    #[serde(default)]
    pub start: u64,
    #[serde(default = "default_length")]
    pub length: i64,
    #[serde(default)]
    pub search: SearchParams,
    #[serde(default)]
    pub order: Vec<OrderParams>,
    #[serde(default)]
    pub columns: Vec<ColumnParams>,
}

fn default_length() -> i64 {
    -1
}

impl Default for TableRequest {
    fn default() -> Self {
        Self {
            draw: 0,
            start: 0,
            length: default_length(),
            search: SearchParams::default(),
            order: Vec::new(),
            columns: Vec::new(),
        }
    }
}
