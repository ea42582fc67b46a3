//! End-to-end compilation scenarios through the public API.

use chrono::NaiveDate;
use lodestone_sql::{
    col, qualified_col, Compiler, Config, Expr, NameStyle, SelectQuery, SqlValue, TemporalFormat,
};

#[test]
fn test_full_statement_under_camel_config() {
    let compiler = Compiler::sqlite(Config {
        names: NameStyle::camel(),
        temporal: TemporalFormat::default(),
    });

    let mut query = SelectQuery::new("userAccounts");
    query.columns = vec![col("userId"), col("displayName")];
    query.and_filter(col("isActive").eq(true).and(col("loginCount").gt(3_i64)));
    query.order = vec![col("displayName").asc()];
    query.limit = Some(5);

    assert_eq!(
        compiler.select(&query).unwrap(),
        "SELECT user_id, display_name FROM user_accounts \
         WHERE is_active = 't' AND login_count > 3 \
         ORDER BY display_name ASC LIMIT 5"
    );
}

#[test]
fn test_surface_storage_transform_is_invertible() {
    let style = NameStyle::camel();
    for surface in ["companyId", "name", "createdAt", "a"] {
        let storage = style.to_storage(surface);
        assert_eq!(style.to_surface(&storage), surface);
    }
}

#[test]
fn test_custom_transform_reaches_compiled_sql() {
    let compiler = Compiler::sqlite(Config {
        names: NameStyle::custom(
            |surface: &str| format!("t_{surface}"),
            |storage: &str| storage.trim_start_matches("t_").to_string(),
        ),
        temporal: TemporalFormat::default(),
    });

    let mut query = SelectQuery::new("users");
    query.columns = vec![col("name")];
    assert_eq!(
        compiler.select(&query).unwrap(),
        "SELECT t_name FROM t_users"
    );
}

#[test]
fn test_temporal_literal_follows_configured_format() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

    let default = Compiler::sqlite(Config::default());
    assert_eq!(
        default.literal(&SqlValue::Date(date)).unwrap(),
        "'2024-03-09'"
    );

    let mut config = Config::default();
    config.temporal.date = String::from("%d/%m/%Y");
    let custom = Compiler::sqlite(config.clone());
    assert_eq!(
        custom.literal(&SqlValue::Date(date)).unwrap(),
        "'09/03/2024'"
    );
    // Parsing back is the exact inverse of the current format.
    assert_eq!(config.temporal.string_to_date("09/03/2024").unwrap(), date);
}

#[test]
fn test_subquery_in_predicate() {
    let compiler = Compiler::sqlite(Config::default());
    let mut inner = SelectQuery::new("orders");
    inner.columns = vec![col("user_id")];
    inner.and_filter(col("total").gt(100_i64));

    let predicate = Expr::InList {
        expr: Box::new(col("id")),
        list: vec![Expr::Subquery(Box::new(inner))],
        negated: false,
    };
    assert_eq!(
        compiler.expr(&predicate).unwrap(),
        "id IN ((SELECT user_id FROM orders WHERE total > 100))"
    );
}

#[test]
fn test_join_predicates_compare_qualified_columns() {
    let compiler = Compiler::sqlite(Config::default());
    let on = qualified_col("employees", "company_id").eq_expr(qualified_col("companies", "id"));
    assert_eq!(
        compiler.expr(&on).unwrap(),
        "employees.company_id = companies.id"
    );
}

#[test]
fn test_quoted_identifiers() {
    let compiler = Compiler::sqlite(Config::default());
    assert_eq!(compiler.expr(&col("Mixed")).unwrap(), "\"Mixed\"");
    assert_eq!(compiler.expr(&col("with space")).unwrap(), "\"with space\"");
    assert_eq!(compiler.expr(&col("plain_name")).unwrap(), "plain_name");
}
