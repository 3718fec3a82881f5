// ═══════════════════════════════════════════════════════════════════
// Service Tests — ExportService (Excel workbooks, CSV)
// ═══════════════════════════════════════════════════════════════════

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use budget_client_core::errors::CoreError;
use budget_client_core::gateway::traits::ExportRow;
use budget_client_core::models::budget::BudgetSnapshot;
use budget_client_core::models::expense::{Currency, Expense};
use budget_client_core::models::month::MonthKey;
use budget_client_core::services::export_service::{
    ExportFormat, ExportService, CSV_CONTENT_TYPE, SHEET_NAME, XLSX_CONTENT_TYPE,
};

fn snapshot(expenses: Vec<Expense>) -> BudgetSnapshot {
    BudgetSnapshot {
        month_key: MonthKey::new(3).unwrap(),
        month_id: 5,
        label: "2025-04".into(),
        total_budget: dec!(50000),
        remaining_budget: dec!(30000),
        expenses,
        fetched_at: Utc::now(),
    }
}

fn expense(id: i64, description: &str, category: Option<&str>) -> Expense {
    Expense {
        id,
        budget_month_id: 5,
        user_id: None,
        description: description.into(),
        amount: dec!(1234.50),
        category: category.map(str::to_string),
        currency: Currency::Eur,
        created_at: Some(Utc.with_ymd_and_hms(2025, 4, 2, 9, 0, 0).unwrap()),
    }
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap()
}

/// Workbooks are zip containers.
fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

mod workbook {
    use super::*;

    #[test]
    fn snapshot_becomes_named_workbook() {
        let file = ExportService::new()
            .snapshot_to_xlsx(&snapshot(vec![
                expense(1, "Groceries", Some("Food")),
                expense(2, "Bus", None),
            ]))
            .unwrap();

        assert_eq!(file.file_name, "April_koltsegek.xlsx");
        assert_eq!(file.content_type, XLSX_CONTENT_TYPE);
        assert!(is_zip(&file.bytes));
        assert_eq!(SHEET_NAME, "Kiadások");
    }

    #[test]
    fn xlsx_is_the_default_format() {
        let service = ExportService::new();
        let data = snapshot(vec![expense(1, "Tea", None)]);
        let file = service
            .export_snapshot(&data, ExportFormat::default())
            .unwrap();
        assert_eq!(file.file_name, "April_koltsegek.xlsx");
        assert!(is_zip(&file.bytes));
    }

    #[test]
    fn server_rows_become_workbook() {
        let mut row = serde_json::Map::new();
        row.insert("description".into(), json!("Tea"));
        row.insert("amount".into(), json!(100));
        row.insert("paid".into(), json!(true));
        row.insert("note".into(), json!(null));
        let file = ExportService::new()
            .rows_to_xlsx(MonthKey::JANUARY, &[row])
            .unwrap();
        assert_eq!(file.file_name, "January_koltsegek.xlsx");
        assert_eq!(file.content_type, XLSX_CONTENT_TYPE);
        assert!(is_zip(&file.bytes));
    }

    #[test]
    fn empty_month_has_no_workbook() {
        let service = ExportService::new();
        assert!(matches!(
            service.snapshot_to_xlsx(&snapshot(vec![])),
            Err(CoreError::Export(_))
        ));
        assert!(matches!(
            service.rows_to_xlsx(MonthKey::JANUARY, &[]),
            Err(CoreError::Export(_))
        ));
    }
}

mod csv_export {
    use super::*;

    #[test]
    fn writes_header_and_rows_in_order() {
        let file = ExportService::new()
            .snapshot_to_csv(&snapshot(vec![
                expense(1, "Groceries", Some("Food")),
                expense(2, "Bus", None),
            ]))
            .unwrap();

        assert_eq!(file.file_name, "April_koltsegek.csv");
        assert_eq!(file.content_type, CSV_CONTENT_TYPE);
        let out = text(file.bytes);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Id,Date,Description,Category,Amount,Currency",
                "1,2025-04-02,Groceries,Food,1234.50,EUR",
                "2,2025-04-02,Bus,,1234.50,EUR",
            ]
        );
    }

    #[test]
    fn quotes_fields_with_commas() {
        let file = ExportService::new()
            .snapshot_to_csv(&snapshot(vec![expense(1, "Milk, bread", None)]))
            .unwrap();
        assert!(text(file.bytes).contains("\"Milk, bread\""));
    }

    #[test]
    fn blank_description_uses_fallback_title() {
        let file = ExportService::new()
            .snapshot_to_csv(&snapshot(vec![expense(1, "   ", None)]))
            .unwrap();
        assert!(text(file.bytes).contains(",Expense,"));
    }

    #[test]
    fn empty_month_cannot_be_exported() {
        assert!(matches!(
            ExportService::new().snapshot_to_csv(&snapshot(vec![])),
            Err(CoreError::Export(_))
        ));
    }

    #[test]
    fn file_name_follows_month() {
        assert_eq!(
            ExportService::file_name(MonthKey::DECEMBER, ExportFormat::Csv),
            "December_koltsegek.csv"
        );
    }
}

mod server_rows {
    use super::*;

    fn row(value: serde_json::Value) -> ExportRow {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn columns_are_union_of_keys() {
        let rows = vec![
            row(json!({"amount": 100, "description": "Tea"})),
            row(json!({"amount": 250.5, "category": "Food", "note": null})),
        ];
        let file = ExportService::new()
            .rows_to_csv(MonthKey::JANUARY, &rows)
            .unwrap();
        assert_eq!(file.file_name, "January_koltsegek.csv");

        let out = text(file.bytes);
        let mut lines = out.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(header.len(), 4);
        for column in ["amount", "description", "category", "note"] {
            assert!(header.contains(&column), "missing column {column}");
        }
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn no_rows_is_an_error() {
        assert!(matches!(
            ExportService::new().rows_to_csv(MonthKey::JANUARY, &[]),
            Err(CoreError::Export(_))
        ));
    }
}
