use proptest::prelude::*;
use shopclean::{
    coerce::cast_column,
    data::Value,
    dataset::{Column, Table},
    normalize::normalize_table,
    schema::{ColumnType, TypeTag},
};

fn cell() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        "[ \t]{0,3}".prop_map(|s| Some(Value::String(s))),
        "[a-z0-9 .-]{1,6}".prop_map(|s| Some(Value::String(s))),
        any::<i64>().prop_map(|i| Some(Value::Integer(i))),
        (-1.0e6f64..1.0e6).prop_map(|f| Some(Value::Float(f))),
        any::<bool>().prop_map(|b| Some(Value::Boolean(b))),
    ]
}

fn tag() -> impl Strategy<Value = TypeTag> {
    prop_oneof![
        Just(TypeTag::String),
        Just(TypeTag::Category),
        Just(TypeTag::NullableInt),
        Just(TypeTag::NullableBool),
        Just(TypeTag::Float),
        Just(TypeTag::Date),
    ]
}

fn conforms(value: &Value, column_type: ColumnType) -> bool {
    match column_type {
        ColumnType::String | ColumnType::Category => matches!(value, Value::String(_)),
        ColumnType::NullableInt => matches!(value, Value::Integer(_)),
        ColumnType::Float => matches!(value, Value::Float(_)),
        ColumnType::NullableBool => matches!(value, Value::Boolean(_)),
        ColumnType::DateTime => matches!(value, Value::DateTime(_)),
        _ => false,
    }
}

proptest! {
    #[test]
    fn normalizing_twice_changes_nothing(values in prop::collection::vec(cell(), 0..40)) {
        let mut table = Table::new(
            "t",
            vec![Column::new("c", ColumnType::Text, values)],
        )
        .unwrap();
        normalize_table(&mut table);
        let once = table.clone();
        let diagnostics = normalize_table(&mut table);
        prop_assert!(diagnostics.is_empty());
        prop_assert_eq!(table, once);
    }

    #[test]
    fn normalized_tables_hold_no_blank_text(values in prop::collection::vec(cell(), 0..40)) {
        let mut table = Table::new(
            "t",
            vec![Column::new("c", ColumnType::Text, values)],
        )
        .unwrap();
        normalize_table(&mut table);
        prop_assert!(table.columns[0].values.iter().flatten().all(|v| !v.is_blank_text()));
    }

    #[test]
    fn casts_convert_every_value_or_none(
        values in prop::collection::vec(cell(), 0..30),
        target in tag(),
    ) {
        let source = Column::new("c", ColumnType::Text, values);
        match cast_column(&source, target) {
            Ok(cast) => {
                prop_assert_eq!(cast.column_type, target.column_type());
                prop_assert_eq!(cast.len(), source.len());
                for (before, after) in source.values.iter().zip(&cast.values) {
                    prop_assert_eq!(before.is_none(), after.is_none());
                    if let Some(value) = after {
                        prop_assert!(conforms(value, cast.column_type));
                    }
                }
            }
            Err(err) => {
                prop_assert!(err.row < source.len());
                prop_assert!(source.values[err.row].is_some());
            }
        }
    }
}
