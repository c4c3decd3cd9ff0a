//! Column types, cast tags, and the per-table schema configuration.
//!
//! [`ColumnType`] is the runtime type of a loaded column. [`TypeTag`] is the
//! narrower vocabulary a schema file may request a column be cast to.
//! [`SchemaConfig`] bundles one [`TableSchema`] per table and is loaded once,
//! validated, and then passed explicitly through the pipeline.
//!
//! The built-in configuration ([`SchemaConfig::ecommerce`]) describes the
//! eleven e-commerce tables; a YAML file with the same shape can replace it.

use std::{
    collections::HashSet,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{EtlError, EtlResult};

pub const CURRENT_SCHEMA_VERSION: &str = "1";

/// Source tables in load order. The first column of each is its primary key.
pub const TABLE_NAMES: [&str; 11] = [
    "orders",
    "order_items",
    "customers",
    "products",
    "categories",
    "inventory",
    "brands",
    "promotions",
    "reviews",
    "suppliers",
    "warehouses",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Untyped text as read from the source.
    Text,
    String,
    Category,
    /// Integer column without nulls.
    Integer,
    NullableInt,
    Float,
    /// Boolean column without nulls.
    Boolean,
    NullableBool,
    DateTime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::String => "string",
            ColumnType::Category => "category",
            ColumnType::Integer => "integer",
            ColumnType::NullableInt => "nullable-int",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::NullableBool => "nullable-bool",
            ColumnType::DateTime => "datetime",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "text",
            "string",
            "category",
            "integer",
            "nullable-int",
            "float",
            "boolean",
            "nullable-bool",
            "datetime",
        ]
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ColumnType::Text | ColumnType::String | ColumnType::Category
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::NullableInt)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "text" => Ok(ColumnType::Text),
            "string" => Ok(ColumnType::String),
            "category" => Ok(ColumnType::Category),
            "integer" | "int" => Ok(ColumnType::Integer),
            "nullable-int" => Ok(ColumnType::NullableInt),
            "float" | "double" => Ok(ColumnType::Float),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "nullable-bool" => Ok(ColumnType::NullableBool),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

/// Target of a schema cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Category,
    NullableInt,
    NullableBool,
    Float,
    Date,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Category => "category",
            TypeTag::NullableInt => "nullable-int",
            TypeTag::NullableBool => "nullable-bool",
            TypeTag::Float => "float",
            TypeTag::Date => "date",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "string",
            "category",
            "nullable-int",
            "nullable-bool",
            "float",
            "date",
        ]
    }

    /// Column type produced by a successful cast to this tag.
    pub fn column_type(&self) -> ColumnType {
        match self {
            TypeTag::String => ColumnType::String,
            TypeTag::Category => ColumnType::Category,
            TypeTag::NullableInt => ColumnType::NullableInt,
            TypeTag::NullableBool => ColumnType::NullableBool,
            TypeTag::Float => ColumnType::Float,
            TypeTag::Date => ColumnType::DateTime,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "string" => Ok(TypeTag::String),
            "category" => Ok(TypeTag::Category),
            "nullable-int" => Ok(TypeTag::NullableInt),
            "nullable-bool" => Ok(TypeTag::NullableBool),
            "float" | "double" => Ok(TypeTag::Float),
            "date" | "datetime" => Ok(TypeTag::Date),
            _ => Err(anyhow!(
                "Unknown type tag '{value}'. Supported tags: {}",
                TypeTag::variants().join(", ")
            )),
        }
    }
}

impl Serialize for TypeTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TypeTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        TypeTag::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnCast {
    pub column: String,
    #[serde(rename = "type")]
    pub tag: TypeTag,
}

/// Literal used to fill nulls in an optional text column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FillDefault {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub casts: Vec<ColumnCast>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fill: Vec<FillDefault>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            casts: Vec::new(),
            date_columns: Vec::new(),
            fill: Vec::new(),
        }
    }

    pub fn with_casts(mut self, casts: &[(&str, TypeTag)]) -> Self {
        self.casts.extend(casts.iter().map(|(column, tag)| ColumnCast {
            column: column.to_string(),
            tag: *tag,
        }));
        self
    }

    pub fn with_dates(mut self, columns: &[&str]) -> Self {
        self.date_columns
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_fill(mut self, column: &str, value: &str) -> Self {
        self.fill.push(FillDefault {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn cast_for(&self, column: &str) -> Option<TypeTag> {
        self.casts
            .iter()
            .find(|cast| cast.column == column)
            .map(|cast| cast.tag)
    }

    fn validate(&self) -> EtlResult<()> {
        let invalid = |message: String| EtlError::InvalidSchema(message);
        if !TABLE_NAMES.contains(&self.name.as_str()) {
            return Err(invalid(format!(
                "unknown table '{}'; expected one of: {}",
                self.name,
                TABLE_NAMES.join(", ")
            )));
        }
        let mut seen = HashSet::new();
        for cast in &self.casts {
            if cast.column.trim().is_empty() {
                return Err(invalid(format!("table '{}' has an empty cast column", self.name)));
            }
            if !seen.insert(cast.column.as_str()) {
                return Err(invalid(format!(
                    "table '{}' declares column '{}' more than once",
                    self.name, cast.column
                )));
            }
        }
        let mut dates = HashSet::new();
        for column in &self.date_columns {
            if !dates.insert(column.as_str()) {
                return Err(invalid(format!(
                    "table '{}' lists date column '{}' more than once",
                    self.name, column
                )));
            }
            if let Some(tag) = self.cast_for(column)
                && tag != TypeTag::Date
            {
                return Err(invalid(format!(
                    "table '{}' column '{}' is both a date column and cast to {}",
                    self.name, column, tag
                )));
            }
        }
        for fill in &self.fill {
            // Filling an id or flag with a literal would invent a relation.
            if is_key_column(&fill.column) {
                return Err(invalid(format!(
                    "table '{}' key column '{}' cannot take a fill value",
                    self.name, fill.column
                )));
            }
            match self.cast_for(&fill.column) {
                None | Some(TypeTag::String) | Some(TypeTag::Category) => {}
                Some(tag) => {
                    return Err(invalid(format!(
                        "table '{}' column '{}' is cast to {} and cannot take a fill value",
                        self.name, fill.column, tag
                    )));
                }
            }
            if dates.contains(fill.column.as_str()) {
                return Err(invalid(format!(
                    "table '{}' date column '{}' cannot take a fill value",
                    self.name, fill.column
                )));
            }
        }
        Ok(())
    }
}

/// Primary and foreign keys all follow the `<entity>_id` naming.
fn is_key_column(column: &str) -> bool {
    let column = column.trim().to_ascii_lowercase();
    column == "id" || column.ends_with("_id")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    pub tables: Vec<TableSchema>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self::ecommerce()
    }
}

impl SchemaConfig {
    /// Casts, date columns and fill values for the e-commerce dataset.
    pub fn ecommerce() -> Self {
        use TypeTag::{Category, Float, NullableBool, NullableInt};
        const TEXT: TypeTag = TypeTag::String;

        let tables = vec![
            TableSchema::new("orders")
                .with_casts(&[
                    ("customer_id", NullableInt),
                    ("promotion_id", NullableInt),
                    ("status", Category),
                    ("payment_method", Category),
                    ("shipping_method", Category),
                    ("shipping_cost", Float),
                    ("total_amount", Float),
                    ("order_number", TEXT),
                    ("notes", TEXT),
                ])
                .with_dates(&["order_date"])
                .with_fill("notes", "Sin notas"),
            TableSchema::new("order_items").with_casts(&[
                ("product_id", NullableInt),
                ("quantity", NullableInt),
                ("unit_price", Float),
            ]),
            TableSchema::new("customers")
                .with_casts(&[
                    ("first_name", TEXT),
                    ("last_name", TEXT),
                    ("email", TEXT),
                    ("phone", TEXT),
                    ("city", Category),
                    ("country", Category),
                    ("postal_code", TEXT),
                    ("segment", Category),
                    ("is_verified", NullableBool),
                    ("accepts_marketing", NullableBool),
                ])
                .with_dates(&["birth_date", "registration_date", "last_login"]),
            TableSchema::new("products")
                .with_casts(&[
                    ("product_id", NullableInt),
                    ("sku", TEXT),
                    ("product_name", TEXT),
                    ("description", TEXT),
                    ("is_active", NullableBool),
                ])
                .with_dates(&["created_at", "updated_at"]),
            TableSchema::new("categories").with_casts(&[
                ("category_name", Category),
                ("description", TEXT),
                ("parent_category_id", NullableInt),
                ("is_active", NullableBool),
            ]),
            TableSchema::new("inventory").with_dates(&["last_restock_date"]),
            TableSchema::new("brands").with_casts(&[
                ("brand_name", TEXT),
                ("country_of_origin", Category),
                ("website", TEXT),
            ]),
            TableSchema::new("promotions")
                .with_casts(&[
                    ("promotion_code", TEXT),
                    ("promotion_name", TEXT),
                    ("promotion_type", Category),
                    ("discount_value", NullableInt),
                    ("min_order_amount", NullableInt),
                    ("max_uses", NullableInt),
                    ("current_uses", NullableInt),
                    ("is_active", NullableBool),
                ])
                .with_dates(&["start_date", "end_date"]),
            TableSchema::new("reviews")
                .with_casts(&[
                    ("title", TEXT),
                    ("comment", TEXT),
                    ("is_verified_purchase", NullableBool),
                ])
                .with_dates(&["created_at"]),
            TableSchema::new("suppliers").with_casts(&[
                ("supplier_name", TEXT),
                ("contact_name", TEXT),
                ("email", TEXT),
                ("phone", TEXT),
                ("address", TEXT),
                ("is_active", NullableBool),
            ]),
            TableSchema::new("warehouses").with_casts(&[
                ("warehouse_name", TEXT),
                ("location", Category),
                ("manager_name", TEXT),
            ]),
        ];
        Self {
            schema_version: Some(CURRENT_SCHEMA_VERSION.to_string()),
            tables,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn validate(&self) -> EtlResult<()> {
        if let Some(name) = self.tables.iter().map(|t| t.name.as_str()).duplicates().next() {
            return Err(EtlError::InvalidSchema(format!(
                "table '{name}' is configured more than once"
            )));
        }
        self.tables.iter().try_for_each(TableSchema::validate)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: SchemaConfig =
            serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        config
            .validate()
            .with_context(|| format!("Validating schema file {path:?}"))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating schema file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing schema YAML")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing schema to YAML string")
    }
}
