use pretty_assertions::assert_eq;
use tests::{
    models::{self, Course, Person, Student},
    TestDb,
};
use trestle::{driver::Capability, shared, Builder, CascadeMode, EntityPersister, Shared};

fn people() -> Vec<Shared<Person>> {
    ["Alice", "Bob", "Carol"]
        .into_iter()
        .map(|name| shared(Person::named(name)))
        .collect()
}

#[tokio::test]
async fn one_insert_per_table_when_the_store_batches() {
    let mut db = TestDb::new();
    let models = models::person(CascadeMode::All, CascadeMode::All).unwrap();
    let persons: EntityPersister<Person> = Builder::new().build_entity(&models.person).unwrap();
    let schema = persons.persisters().schema().clone();

    let people = people();
    persons.insert_all(&mut db.conn, &people).await.unwrap();

    assert_eq!(db.log.inserts_into(&schema, "person"), 1);
    assert_eq!(db.row_count("person"), 3);

    // Identifiers come back in row order.
    let ids = people
        .iter()
        .map(|person| person.read().id.unwrap())
        .collect::<Vec<_>>();
    assert_eq!(ids, [1, 2, 3]);
}

#[tokio::test]
async fn one_insert_per_row_otherwise() {
    let mut db = TestDb::with_capability(Capability::MINIMAL);
    let models = models::person(CascadeMode::All, CascadeMode::All).unwrap();
    let persons: EntityPersister<Person> = Builder::new().build_entity(&models.person).unwrap();
    let schema = persons.persisters().schema().clone();

    let people = people();
    persons.insert_all(&mut db.conn, &people).await.unwrap();

    assert_eq!(db.log.inserts_into(&schema, "person"), 3);
    assert_eq!(db.row_count("person"), 3);
    for person in &people {
        assert!(person.read().id.is_some());
    }
}

#[tokio::test]
async fn association_rows_follow_the_store_capability() {
    for (capability, expected) in [(Capability::RELATIONAL, 1), (Capability::MINIMAL, 2)] {
        let mut db = TestDb::with_capability(capability);
        let models = models::student(CascadeMode::All).unwrap();
        let students: EntityPersister<Student> =
            Builder::new().build_entity(&models.student).unwrap();
        let schema = students.persisters().schema().clone();

        let sam = shared(Student {
            courses: vec![shared(Course::titled("Math")), shared(Course::titled("Art"))],
            ..Student::named("Sam")
        });
        students.insert(&mut db.conn, &sam).await.unwrap();

        assert_eq!(db.log.inserts_into(&schema, "course"), expected);
        assert_eq!(db.log.inserts_into(&schema, "student_courses"), expected);
        assert_eq!(db.row_count("student_courses"), 2);
    }
}
