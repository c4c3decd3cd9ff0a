//! Business aggregates over the cleaned `orders`, `order_items` and
//! `products` tables.
//!
//! Every grouping keeps groups in first-appearance order and every ranking
//! uses a stable sort, so ties resolve to the group seen first in the input.

use std::{collections::BTreeMap, collections::HashMap, fmt};

use chrono::Datelike;
use serde::Serialize;

use crate::{
    data::{Value, ValueKey, float_to_exact_i64},
    dataset::{Column, Table, TableRegistry},
    error::{EtlError, EtlResult},
    schema::ColumnType,
};

pub const DEFAULT_TOP_CLIENTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientSpending {
    pub customer_id: Option<Value>,
    pub valor_total_gastado: f64,
    pub cantidad_ordenes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSales {
    pub product_id: Option<Value>,
    pub product_name: Option<String>,
    pub cantidad_total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySales {
    pub month: YearMonth,
    pub total_sales: f64,
}

fn ensure_rows(table: &Table, aggregate: &'static str) -> EtlResult<()> {
    if table.row_count() == 0 {
        return Err(EtlError::EmptyAggregationInput {
            aggregate,
            table: table.name.clone(),
        });
    }
    Ok(())
}

fn numeric_column<'a>(table: &'a Table, name: &str) -> EtlResult<&'a Column> {
    let column = table.require_column(name)?;
    if !column.column_type.is_numeric() {
        return Err(EtlError::ColumnType {
            table: table.name.clone(),
            column: name.to_string(),
            expected: "numeric",
            found: column.column_type.to_string(),
        });
    }
    Ok(column)
}

/// Column type for a grouping key copied out of `source`.
fn key_type(source: &Column, has_null: bool) -> ColumnType {
    match source.column_type {
        ColumnType::Integer if has_null => ColumnType::NullableInt,
        ColumnType::Boolean if has_null => ColumnType::NullableBool,
        other => other,
    }
}

/// Every customer's spend and order count, biggest spender first.
pub fn sales_per_client(orders: &Table) -> EtlResult<Vec<ClientSpending>> {
    ensure_rows(orders, "sales per client")?;
    let customers = orders.require_column("customer_id")?;
    let amounts = numeric_column(orders, "total_amount")?;

    let mut positions: HashMap<ValueKey, usize> = HashMap::new();
    let mut groups: Vec<ClientSpending> = Vec::new();
    for (customer, amount) in customers.values.iter().zip(&amounts.values) {
        let key = ValueKey::from_cell(customer.as_ref());
        let idx = *positions.entry(key).or_insert_with(|| {
            groups.push(ClientSpending {
                customer_id: customer.clone(),
                valor_total_gastado: 0.0,
                cantidad_ordenes: 0,
            });
            groups.len() - 1
        });
        let group = &mut groups[idx];
        group.cantidad_ordenes += 1;
        if let Some(value) = amount.as_ref().and_then(Value::as_f64) {
            group.valor_total_gastado += value;
        }
    }
    groups.sort_by(|a, b| b.valor_total_gastado.total_cmp(&a.valor_total_gastado));
    Ok(groups)
}

/// The `limit` biggest spenders (fewer when fewer customers exist).
pub fn top_spenders(orders: &Table, limit: usize) -> EtlResult<Vec<ClientSpending>> {
    let mut ranking = sales_per_client(orders)?;
    ranking.truncate(limit);
    Ok(ranking)
}

/// Units sold per (product_id, product_name), best seller first.
///
/// Line items without a matching product keep a null name rather than being
/// dropped.
pub fn product_sales(order_items: &Table, products: &Table) -> EtlResult<Vec<ProductSales>> {
    ensure_rows(order_items, "most sold product")?;
    let item_products = order_items.require_column("product_id")?;
    let quantities = numeric_column(order_items, "quantity")?;
    let catalog_ids = products.require_column("product_id")?;
    let catalog_names = products.require_column("product_name")?;

    // First catalog entry wins when a product id repeats.
    let mut names: HashMap<ValueKey, Option<String>> = HashMap::new();
    for (id, name) in catalog_ids.values.iter().zip(&catalog_names.values) {
        names
            .entry(ValueKey::from_cell(id.as_ref()))
            .or_insert_with(|| name.as_ref().map(Value::as_display));
    }

    let mut positions: HashMap<(ValueKey, Option<String>), usize> = HashMap::new();
    let mut groups: Vec<ProductSales> = Vec::new();
    for (row, (product, quantity)) in item_products.values.iter().zip(&quantities.values).enumerate()
    {
        let id_key = ValueKey::from_cell(product.as_ref());
        let name = names.get(&id_key).cloned().flatten();
        let idx = *positions
            .entry((id_key, name.clone()))
            .or_insert_with(|| {
                groups.push(ProductSales {
                    product_id: product.clone(),
                    product_name: name,
                    cantidad_total: 0,
                });
                groups.len() - 1
            });
        let units = match quantity {
            None => 0,
            Some(Value::Integer(i)) => *i,
            Some(Value::Float(f)) => float_to_exact_i64(*f).ok_or_else(|| EtlError::ColumnType {
                table: order_items.name.clone(),
                column: "quantity".to_string(),
                expected: "whole units",
                found: format!("{f} at row {row}"),
            })?,
            Some(other) => {
                return Err(EtlError::ColumnType {
                    table: order_items.name.clone(),
                    column: "quantity".to_string(),
                    expected: "numeric",
                    found: other.as_display(),
                });
            }
        };
        let group = &mut groups[idx];
        group.cantidad_total = group
            .cantidad_total
            .checked_add(units)
            .ok_or_else(|| EtlError::ColumnType {
                table: order_items.name.clone(),
                column: "quantity".to_string(),
                expected: "a unit total within i64",
                found: format!("{units} at row {row}"),
            })?;
    }
    groups.sort_by(|a, b| b.cantidad_total.cmp(&a.cantidad_total));
    Ok(groups)
}

pub fn most_sold_product(order_items: &Table, products: &Table) -> EtlResult<ProductSales> {
    product_sales(order_items, products)?
        .into_iter()
        .next()
        .ok_or_else(|| EtlError::EmptyAggregationInput {
            aggregate: "most sold product",
            table: order_items.name.clone(),
        })
}

/// Order totals per calendar month, oldest month first. Orders without a
/// date are left out.
pub fn monthly_sales(orders: &Table) -> EtlResult<Vec<MonthlySales>> {
    ensure_rows(orders, "monthly sales")?;
    let dates = orders.require_column("order_date")?;
    if dates.column_type != ColumnType::DateTime {
        return Err(EtlError::ColumnType {
            table: orders.name.clone(),
            column: "order_date".to_string(),
            expected: "datetime",
            found: dates.column_type.to_string(),
        });
    }
    let amounts = numeric_column(orders, "total_amount")?;

    let mut totals: BTreeMap<YearMonth, f64> = BTreeMap::new();
    for (date, amount) in dates.values.iter().zip(&amounts.values) {
        let Some(Value::DateTime(dt)) = date else {
            continue;
        };
        let month = YearMonth {
            year: dt.year(),
            month: dt.month(),
        };
        let total = totals.entry(month).or_insert(0.0);
        if let Some(value) = amount.as_ref().and_then(Value::as_f64) {
            *total += value;
        }
    }
    Ok(totals
        .into_iter()
        .map(|(month, total_sales)| MonthlySales { month, total_sales })
        .collect())
}

/// All three aggregates for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregates {
    pub sales_per_client: Vec<ClientSpending>,
    pub most_sold_product: ProductSales,
    pub sales_per_month: Vec<MonthlySales>,
    #[serde(skip)]
    customer_id_type: ColumnType,
    #[serde(skip)]
    product_id_type: ColumnType,
    #[serde(skip)]
    product_name_type: ColumnType,
}

impl Aggregates {
    pub fn compute(registry: &TableRegistry) -> EtlResult<Self> {
        let orders = registry.require("orders")?;
        let order_items = registry.require("order_items")?;
        let products = registry.require("products")?;

        let sales_per_client = sales_per_client(orders)?;
        let most_sold_product = most_sold_product(order_items, products)?;
        let sales_per_month = monthly_sales(orders)?;

        let customer_id_type = key_type(
            orders.require_column("customer_id")?,
            sales_per_client.iter().any(|c| c.customer_id.is_none()),
        );
        let product_id_type = key_type(
            order_items.require_column("product_id")?,
            most_sold_product.product_id.is_none(),
        );
        let product_name_type = products.require_column("product_name")?.column_type;

        Ok(Self {
            sales_per_client,
            most_sold_product,
            sales_per_month,
            customer_id_type,
            product_id_type,
            product_name_type,
        })
    }

    pub fn top_clients(&self, limit: usize) -> &[ClientSpending] {
        &self.sales_per_client[..limit.min(self.sales_per_client.len())]
    }

    pub fn sales_per_client_table(&self) -> Table {
        let rows = &self.sales_per_client;
        Table {
            name: "sales_per_client".to_string(),
            columns: vec![
                Column::new(
                    "customer_id",
                    self.customer_id_type,
                    rows.iter().map(|r| r.customer_id.clone()).collect(),
                ),
                Column::new(
                    "valor_total_gastado",
                    ColumnType::Float,
                    rows.iter()
                        .map(|r| Some(Value::Float(r.valor_total_gastado)))
                        .collect(),
                ),
                Column::new(
                    "cantidad_ordenes",
                    ColumnType::Integer,
                    rows.iter()
                        .map(|r| Some(Value::Integer(r.cantidad_ordenes as i64)))
                        .collect(),
                ),
            ],
        }
    }

    pub fn sales_per_month_table(&self) -> Table {
        let rows = &self.sales_per_month;
        Table {
            name: "sales_per_month".to_string(),
            columns: vec![
                Column::new(
                    "month",
                    ColumnType::String,
                    rows.iter()
                        .map(|r| Some(Value::String(r.month.to_string())))
                        .collect(),
                ),
                Column::new(
                    "total_sales",
                    ColumnType::Float,
                    rows.iter().map(|r| Some(Value::Float(r.total_sales))).collect(),
                ),
            ],
        }
    }

    pub fn most_sold_product_table(&self) -> Table {
        let top = &self.most_sold_product;
        Table {
            name: "most_sold_product".to_string(),
            columns: vec![
                Column::new("product_id", self.product_id_type, vec![top.product_id.clone()]),
                Column::new(
                    "product_name",
                    self.product_name_type,
                    vec![top.product_name.clone().map(Value::String)],
                ),
                Column::new(
                    "cantidad_total",
                    ColumnType::Integer,
                    vec![Some(Value::Integer(top.cantidad_total))],
                ),
            ],
        }
    }

    pub fn tables(&self) -> Vec<Table> {
        vec![
            self.sales_per_client_table(),
            self.sales_per_month_table(),
            self.most_sold_product_table(),
        ]
    }
}
