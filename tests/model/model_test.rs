#[cfg(test)]
mod tests {
    use pbimeta::model::{
        Cardinality, Column, CrossFilterDirection, DataSource, Measure, ModelBuilder, Relationship,
        Table,
    };
    use pbimeta::slug::slugify;
    use pbimeta::ParseError;

    fn sales() -> Table {
        Table::new("Sales")
            .with_column(Column::new("CustomerID", "int64"))
            .with_column(Column::new("Amount", "decimal").with_description("Net amount"))
            .with_measure(Measure::new("Total Sales", "SUM(Sales[Amount])"))
    }

    fn customer() -> Table {
        Table::new("Customer").with_column(Column::new("CustomerID", "int64"))
    }

    #[test]
    fn test_builder_sets_owning_table() {
        let model = ModelBuilder::new("Shop")
            .tables([sales(), customer()])
            .measure(Measure::new("Customers", "COUNTROWS(Customer)").in_table("Customer"))
            .build()
            .unwrap();

        assert_eq!(model.name(), "Shop");
        assert!(model.columns().all(|c| !c.table.is_empty()));
        assert_eq!(model.table("Sales").unwrap().columns[1].table, "Sales");

        let owners: Vec<_> = model
            .measures()
            .iter()
            .map(|m| (m.name.as_str(), m.table.as_str()))
            .collect();
        assert_eq!(owners, [("Total Sales", "Sales"), ("Customers", "Customer")]);
        assert_eq!(model.table("Customer").unwrap().measures.len(), 1);
    }

    #[test]
    fn test_measure_defaults() {
        let measure = Measure::new("Total", "1");
        assert_eq!(measure.format_string, "");
        assert_eq!(measure.display_folder, "");
        assert_eq!(measure.description, "");
        assert!(!measure.is_hidden);
    }

    #[test]
    fn test_table_without_name_is_rejected() {
        let err = ModelBuilder::new("Shop")
            .table(Table::new(""))
            .build()
            .unwrap_err();
        assert!(
            matches!(err, ParseError::MissingField { ref field, ref context, .. }
                if field == "name" && context == "table #1"),
            "{err:?}"
        );
    }

    #[test]
    fn test_duplicate_table_is_rejected() {
        let err = ModelBuilder::new("Shop")
            .tables([sales(), sales()])
            .build()
            .unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"duplicate table 'Sales' in model");
    }

    #[test]
    fn test_duplicate_measure_in_table_is_rejected() {
        let err = ModelBuilder::new("Shop")
            .table(sales())
            .measure(Measure::new("Total Sales", "0").in_table("Sales"))
            .build()
            .unwrap_err();
        assert!(
            matches!(err, ParseError::Duplicate { kind: "measure", .. }),
            "{err:?}"
        );
    }

    #[test]
    fn test_relationship_endpoints_must_exist() {
        let err = ModelBuilder::new("Shop")
            .tables([sales(), customer()])
            .relationship(Relationship::new("Sales", "CustomerID", "Customer", "Key"))
            .build()
            .unwrap_err();
        assert!(
            matches!(err, ParseError::UndefinedReference { ref name, .. } if name == "Customer.Key"),
            "{err:?}"
        );
    }

    #[test]
    fn test_table_source_must_name_a_table() {
        let err = ModelBuilder::new("Shop")
            .table(sales())
            .data_source(DataSource::for_table("Orders", "let x = 1 in x"))
            .build()
            .unwrap_err();
        assert!(
            matches!(err, ParseError::UndefinedReference { ref name, .. } if name == "Orders"),
            "{err:?}"
        );

        // Shared expressions are unbound.
        let model = ModelBuilder::new("Shop")
            .table(sales())
            .data_source(DataSource::shared("Server", "\"db\""))
            .build()
            .unwrap();
        assert_eq!(model.data_sources()[0].table, None);
    }

    #[test]
    fn test_relationships_for_table() {
        let model = ModelBuilder::new("Shop")
            .tables([sales(), customer(), Table::new("Region")])
            .relationship(Relationship::new("Sales", "CustomerID", "Customer", "CustomerID"))
            .build()
            .unwrap();
        assert_eq!(model.relationships_for("Customer").count(), 1);
        assert_eq!(model.relationships_for("Region").count(), 0);
    }

    #[test]
    fn test_serialized_shape() {
        let model = ModelBuilder::new("Shop")
            .tables([sales(), customer()])
            .relationship(
                Relationship::new("Sales", "CustomerID", "Customer", "CustomerID")
                    .with_cross_filter(CrossFilterDirection::Both),
            )
            .size_bytes(Some(2048))
            .build()
            .unwrap();

        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["name"], "Shop");
        assert_eq!(json["size_bytes"], 2048);
        assert_eq!(json["relationships"][0]["cardinality"], "many-to-one");
        assert_eq!(json["relationships"][0]["cross_filter_direction"], "both");
        assert_eq!(json["tables"][0]["columns"][1]["description"], "Net amount");
        assert_eq!(json["measures"][0]["table"], "Sales");
    }

    #[test]
    fn test_cardinality_round_trip_through_display() {
        for cardinality in [
            Cardinality::OneToOne,
            Cardinality::OneToMany,
            Cardinality::ManyToOne,
            Cardinality::ManyToMany,
        ] {
            let parsed = Cardinality::parse(&cardinality.to_string(), "test").unwrap();
            assert_eq!(parsed, cardinality);
        }
        assert_eq!(Cardinality::ManyToOne.reverse(), Cardinality::OneToMany);
    }

    #[test]
    fn test_slugify_model_names() {
        assert_eq!(slugify("Sales Model"), "sales-model");
        assert_eq!(slugify("Finance_2024/Q1"), "finance-2024-q1");
        assert_eq!(slugify("already-slugged"), "already-slugged");
    }
}
