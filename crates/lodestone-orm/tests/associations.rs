//! Association resolution: eager batching, lazy caching, and mutators.

use lodestone_orm::{
    AssociationDef, Connection, ModelDef, OrmError, Registry, RegistryBuilder, Related,
};
use lodestone_sql::{col, Config, SqlValue};

async fn setup_companies(eager: bool) -> (Connection, Registry) {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE companies (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    conn.execute(
        "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT, company_id INTEGER)",
    )
    .await
    .unwrap();

    let employees = AssociationDef::one_to_many("employees", "employee");
    let employees = if eager { employees.eager() } else { employees };

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(ModelDef::new("company", "companies").associate(employees))
        .unwrap();
    builder
        .define(
            ModelDef::new("employee", "employees")
                .associate(AssociationDef::many_to_one("company", "company")),
        )
        .unwrap();
    let registry = builder.sync(conn.clone()).await.unwrap();
    (conn, registry)
}

async fn seed_companies(registry: &Registry, companies: usize, employees_each: usize) {
    let company = registry.model("company").unwrap();
    let employee = registry.model("employee").unwrap();
    for c in 0..companies {
        let mut row = company
            .create(vec![("name", format!("company {c}"))])
            .unwrap();
        row.save().await.unwrap();
        let company_id = row.get("id").cloned().unwrap();
        for e in 0..employees_each {
            let mut emp = employee
                .create(vec![
                    ("name", SqlValue::Text(format!("employee {c}/{e}"))),
                    ("company_id", company_id.clone()),
                ])
                .unwrap();
            emp.save().await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_eager_batching_is_one_extra_query() {
    for companies in [1_usize, 50] {
        let (conn, registry) = setup_companies(true).await;
        seed_companies(&registry, companies, 2).await;

        let before = conn.statement_count();
        let loaded = registry.model("company").unwrap().query().all().await.unwrap();
        assert_eq!(loaded.len(), companies);
        // One query for the owners, one for the association.
        assert_eq!(conn.statement_count() - before, 2);

        for company in &loaded {
            let cached = company.related_cached("employees").unwrap();
            assert_eq!(cached.len(), 2);
        }
    }
}

#[tokio::test]
async fn test_eager_with_empty_owner_set_issues_no_extra_query() {
    let (conn, registry) = setup_companies(true).await;

    let before = conn.statement_count();
    let loaded = registry.model("company").unwrap().query().all().await.unwrap();
    assert!(loaded.is_empty());
    assert_eq!(conn.statement_count() - before, 1);
}

#[tokio::test]
async fn test_eager_partitions_rows_onto_the_right_owner() {
    let (_conn, registry) = setup_companies(true).await;
    seed_companies(&registry, 3, 1).await;

    let loaded = registry
        .model("company")
        .unwrap()
        .query()
        .order(col("id").asc())
        .all()
        .await
        .unwrap();
    for company in &loaded {
        let employees = company.related_cached("employees").unwrap().clone().many();
        assert_eq!(employees.len(), 1);
        assert_eq!(
            employees[0].get("company_id"),
            company.get("id"),
        );
    }
}

#[tokio::test]
async fn test_lazy_resolution_is_cached() {
    let (conn, registry) = setup_companies(false).await;
    seed_companies(&registry, 1, 1).await;

    let mut emp = registry.model("employee").unwrap().get(1_i64).await.unwrap();
    assert!(emp.related_cached("company").is_none());

    let before = conn.statement_count();
    let company = emp.related("company").await.unwrap().one().unwrap();
    assert_eq!(company.get("name"), Some(&SqlValue::Text(String::from("company 0"))));
    assert_eq!(conn.statement_count() - before, 1);

    // Second access serves the cache.
    let again = emp.related("company").await.unwrap();
    assert_eq!(conn.statement_count() - before, 1);
    assert_eq!(again.len(), 1);
}

#[tokio::test]
async fn test_null_key_resolves_empty_without_a_query() {
    let (conn, registry) = setup_companies(false).await;
    let employee = registry.model("employee").unwrap();
    let mut orphan = employee.create(vec![("name", "orphan")]).unwrap();
    orphan.save().await.unwrap();

    let before = conn.statement_count();
    let related = orphan.related("company").await.unwrap();
    assert!(related.is_empty());
    assert_eq!(conn.statement_count(), before);
}

#[tokio::test]
async fn test_add_and_remove_related_are_symmetric() {
    let (_conn, registry) = setup_companies(false).await;
    let company = registry.model("company").unwrap();
    let employee = registry.model("employee").unwrap();

    let mut acme = company.create(vec![("name", "acme")]).unwrap();
    acme.save().await.unwrap();
    let mut ann = employee.create(vec![("name", "ann")]).unwrap();
    ann.save().await.unwrap();

    acme.add_related("employees", &mut ann).await.unwrap();
    assert_eq!(ann.get("company_id"), acme.get("id"));
    let related = acme.related("employees").await.unwrap();
    assert_eq!(related.len(), 1);

    // Unlink without destroying: the row survives with a cleared key.
    acme.remove_related("employees", &mut ann, false).await.unwrap();
    assert_eq!(ann.get("company_id"), Some(&SqlValue::Null));
    assert_eq!(employee.count().await.unwrap(), 1);
    let related = acme.related("employees").await.unwrap();
    assert!(related.is_empty());
}

#[tokio::test]
async fn test_remove_related_rejects_an_unlinked_instance() {
    let (_conn, registry) = setup_companies(false).await;
    let company = registry.model("company").unwrap();
    let employee = registry.model("employee").unwrap();

    let mut acme = company.create(vec![("name", "acme")]).unwrap();
    acme.save().await.unwrap();
    let mut globex = company.create(vec![("name", "globex")]).unwrap();
    globex.save().await.unwrap();
    let mut ann = employee.create(vec![("name", "ann")]).unwrap();
    ann.save().await.unwrap();
    acme.add_related("employees", &mut ann).await.unwrap();

    // Ann belongs to acme; unlinking her from globex must not detach her.
    let result = globex.remove_related("employees", &mut ann, false).await;
    assert!(matches!(result, Err(OrmError::Association(_))));
    assert_eq!(ann.get("company_id"), acme.get("id"));
    assert_eq!(acme.related("employees").await.unwrap().len(), 1);

    // The reverse side checks the same link.
    let mut bob = employee.create(vec![("name", "bob")]).unwrap();
    bob.save().await.unwrap();
    bob.add_related("company", &mut globex).await.unwrap();
    let result = bob.remove_related("company", &mut acme, false).await;
    assert!(matches!(result, Err(OrmError::Association(_))));
    assert_eq!(bob.get("company_id"), globex.get("id"));
}

#[tokio::test]
async fn test_remove_related_with_destroy_deletes_the_row() {
    let (_conn, registry) = setup_companies(false).await;
    let company = registry.model("company").unwrap();
    let employee = registry.model("employee").unwrap();

    let mut acme = company.create(vec![("name", "acme")]).unwrap();
    acme.save().await.unwrap();
    let mut ann = employee.create(vec![("name", "ann")]).unwrap();
    ann.save().await.unwrap();
    acme.add_related("employees", &mut ann).await.unwrap();

    acme.remove_related("employees", &mut ann, true).await.unwrap();
    assert_eq!(employee.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_remove_all_related_invalidates_the_cache() {
    let (_conn, registry) = setup_companies(false).await;
    seed_companies(&registry, 1, 3).await;

    let mut acme = registry.model("company").unwrap().get(1_i64).await.unwrap();
    let related = acme.related("employees").await.unwrap();
    assert_eq!(related.len(), 3);

    acme.remove_all_related("employees", false).await.unwrap();
    // The cached collection is dropped, not patched.
    assert!(acme.related_cached("employees").is_none());
    let related = acme.related("employees").await.unwrap();
    assert!(related.is_empty());
    // The rows survive with cleared keys.
    assert_eq!(registry.model("employee").unwrap().count().await.unwrap(), 3);

    // Bulk removal of nothing is still success.
    acme.remove_all_related("employees", false).await.unwrap();
}

#[tokio::test]
async fn test_remove_all_related_with_destroy() {
    let (_conn, registry) = setup_companies(false).await;
    seed_companies(&registry, 1, 3).await;

    let mut acme = registry.model("company").unwrap().get(1_i64).await.unwrap();
    acme.remove_all_related("employees", true).await.unwrap();
    assert_eq!(registry.model("employee").unwrap().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_removing_the_owner_does_not_cascade() {
    let (_conn, registry) = setup_companies(false).await;
    seed_companies(&registry, 1, 2).await;

    let mut acme = registry.model("company").unwrap().get(1_i64).await.unwrap();
    acme.remove().await.unwrap();
    assert_eq!(registry.model("employee").unwrap().count().await.unwrap(), 2);
}

async fn setup_many_to_many() -> (Connection, Registry) {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE students (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    conn.execute("CREATE TABLE courses (id INTEGER PRIMARY KEY, title TEXT)")
        .await
        .unwrap();
    conn.execute(
        "CREATE TABLE courses_students (student_id INTEGER, course_id INTEGER)",
    )
    .await
    .unwrap();

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(
            ModelDef::new("student", "students")
                .associate(AssociationDef::many_to_many("courses", "course").eager()),
        )
        .unwrap();
    builder
        .define(
            ModelDef::new("course", "courses")
                .associate(AssociationDef::many_to_many("students", "student")),
        )
        .unwrap();
    let registry = builder.sync(conn.clone()).await.unwrap();
    (conn, registry)
}

#[tokio::test]
async fn test_many_to_many_round_trip() {
    let (conn, registry) = setup_many_to_many().await;
    let student = registry.model("student").unwrap();
    let course = registry.model("course").unwrap();

    let mut ann = student.create(vec![("name", "ann")]).unwrap();
    ann.save().await.unwrap();
    let mut bob = student.create(vec![("name", "bob")]).unwrap();
    bob.save().await.unwrap();
    let mut math = course.create(vec![("title", "math")]).unwrap();
    math.save().await.unwrap();
    let mut art = course.create(vec![("title", "art")]).unwrap();
    art.save().await.unwrap();

    ann.add_related("courses", &mut math).await.unwrap();
    ann.add_related("courses", &mut art).await.unwrap();
    bob.add_related("courses", &mut math).await.unwrap();

    // Eager: one query for the students, one joined query for courses.
    let before = conn.statement_count();
    let students = student.query().order(col("id").asc()).all().await.unwrap();
    assert_eq!(conn.statement_count() - before, 2);

    let ann_courses = students[0].related_cached("courses").unwrap();
    let bob_courses = students[1].related_cached("courses").unwrap();
    assert_eq!(ann_courses.len(), 2);
    assert_eq!(bob_courses.len(), 1);

    // From the other side, lazily.
    let mut math = course.get(1_i64).await.unwrap();
    let enrolled = math.related("students").await.unwrap();
    assert_eq!(enrolled.len(), 2);
}

#[tokio::test]
async fn test_many_to_many_rejects_an_explicit_key_at_sync() {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE students (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    conn.execute("CREATE TABLE courses (id INTEGER PRIMARY KEY, title TEXT)")
        .await
        .unwrap();
    conn.execute(
        "CREATE TABLE courses_students (student_id INTEGER, course_id INTEGER)",
    )
    .await
    .unwrap();

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(
            ModelDef::new("student", "students").associate(
                AssociationDef::many_to_many("courses", "course").column("course_ref"),
            ),
        )
        .unwrap();
    builder.define(ModelDef::new("course", "courses")).unwrap();

    let result = builder.sync(conn).await;
    assert!(matches!(result, Err(OrmError::Association(_))));
}

#[tokio::test]
async fn test_many_to_many_removal() {
    let (_conn, registry) = setup_many_to_many().await;
    let student = registry.model("student").unwrap();
    let course = registry.model("course").unwrap();

    let mut ann = student.create(vec![("name", "ann")]).unwrap();
    ann.save().await.unwrap();
    let mut math = course.create(vec![("title", "math")]).unwrap();
    math.save().await.unwrap();
    let mut art = course.create(vec![("title", "art")]).unwrap();
    art.save().await.unwrap();
    ann.add_related("courses", &mut math).await.unwrap();
    ann.add_related("courses", &mut art).await.unwrap();

    // Unlinking deletes the join row, not the course.
    ann.remove_related("courses", &mut math, false).await.unwrap();
    let remaining = ann.related("courses").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(course.count().await.unwrap(), 2);

    // Destroying through the bulk path removes the course rows too.
    ann.remove_all_related("courses", true).await.unwrap();
    assert!(ann.related("courses").await.unwrap().is_empty());
    assert_eq!(course.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_association_filter_restricts_rows() {
    let conn = Connection::in_memory().await.unwrap();
    conn.execute("CREATE TABLE companies (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();
    conn.execute(
        "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT, \
         active INTEGER, company_id INTEGER)",
    )
    .await
    .unwrap();

    let mut builder = RegistryBuilder::new(Config::default());
    builder
        .define(
            ModelDef::new("company", "companies").associate(
                AssociationDef::one_to_many("active_employees", "employee")
                    .filter(col("active").eq(1_i64)),
            ),
        )
        .unwrap();
    builder.define(ModelDef::new("employee", "employees")).unwrap();
    let registry = builder.sync(conn.clone()).await.unwrap();

    let company = registry.model("company").unwrap();
    let employee = registry.model("employee").unwrap();
    let mut acme = company.create(vec![("name", "acme")]).unwrap();
    acme.save().await.unwrap();
    for (name, active) in [("ann", 1_i64), ("bob", 0)] {
        let mut emp = employee
            .create(vec![
                ("name", SqlValue::Text(String::from(name))),
                ("active", SqlValue::Int(active)),
                ("company_id", acme.get("id").cloned().unwrap()),
            ])
            .unwrap();
        emp.save().await.unwrap();
    }

    let related = acme.related("active_employees").await.unwrap();
    assert_eq!(related.len(), 1);
    match related {
        Related::Many(items) => {
            assert_eq!(items[0].get("name"), Some(&SqlValue::Text(String::from("ann"))));
        }
        Related::One(_) => panic!("expected a collection"),
    }
}
