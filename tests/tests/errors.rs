use pretty_assertions::assert_eq;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use tests::{
    models::{self, House, Person},
    TestDb,
};
use trestle::{
    driver::{Capability, Operation, Response},
    schema::db::Schema,
    shared, Builder, CascadeMode, Connection, EntityMapping, EntityPersister,
    PolymorphismBuilder, RelationConfig, Result, Shared, SubTypeBuilder,
};
use trestle_core::async_trait;

#[derive(Debug, Default)]
struct Deed {
    id: Option<i64>,
    house: Option<Shared<House>>,
}

fn deeds() -> EntityPersister<Deed> {
    let house = models::house().unwrap();
    let deed: Arc<EntityMapping> = EntityMapping::builder("deed", Deed::default)
        .auto_increment_id("id", |d: &Deed| d.id, |d, id| d.id = id)
        .one_to_one(
            "house",
            &house,
            |d: &Deed| d.house.clone(),
            |d, house| d.house = house,
            RelationConfig::new().mandatory(),
        )
        .build()
        .unwrap();

    Builder::new().build_entity(&deed).unwrap()
}

#[tokio::test]
async fn missing_mandatory_target_is_refused_before_writing() {
    let mut db = TestDb::new();
    let deeds = deeds();

    let deed = shared(Deed::default());
    let err = deeds.insert(&mut db.conn, &deed).await.unwrap_err();

    assert!(err.is_mandatory_relation());
    assert!(err.is_mapping());
    assert_eq!(err.to_string(), "mandatory relation `Deed.house` is not set");
    assert!(db.log.is_empty());
    assert!(deed.read().id.is_none());

    deed.write().house = Some(shared(House::at("1 Main St", "Springfield")));
    deeds.insert(&mut db.conn, &deed).await.unwrap();
    assert_eq!(db.row_count("deed"), 1);

    deed.write().house = None;
    let err = deeds
        .update(&mut db.conn, &deed, None, false)
        .await
        .unwrap_err();
    assert!(err.is_mandatory_relation());
}

#[tokio::test]
async fn updating_a_vanished_row_reports_it() {
    let mut db = TestDb::new();
    let models = models::person(CascadeMode::All, CascadeMode::All).unwrap();
    let persons: EntityPersister<Person> = Builder::new().build_entity(&models.person).unwrap();

    let alice = shared(Person::named("Alice"));
    persons.insert(&mut db.conn, &alice).await.unwrap();

    // Another handle on the same row removes it behind Alice's back.
    let ghost = shared(Person {
        id: alice.read().id,
        ..Person::named("Alice")
    });
    persons.delete(&mut db.conn, &ghost).await.unwrap();

    alice.write().name = "Alicia".to_string();
    let err = persons
        .update(&mut db.conn, &alice, None, false)
        .await
        .unwrap_err();

    assert!(err.is_record_not_found());
    assert!(err.is_store());
    assert!(err.to_string().contains("update Person"), "{err}");
}

#[tokio::test]
async fn store_failures_carry_the_operation() {
    let mut db = TestDb::new();
    let models = models::person(CascadeMode::All, CascadeMode::All).unwrap();
    let persisters = Builder::new().build(&models.person).unwrap();
    let persons: EntityPersister<Person> = persisters.root_entity().unwrap();
    let houses: EntityPersister<House> = persisters.entity_for(&models.house).unwrap();

    let house = shared(House::at("1 Main St", "Springfield"));
    let alice = shared(Person {
        house: Some(house.clone()),
        ..Person::named("Alice")
    });
    persons.insert(&mut db.conn, &alice).await.unwrap();

    // `person.house_id` still references the row.
    let err = houses.delete(&mut db.conn, &house).await.unwrap_err();

    assert!(err.is_store());
    assert!(!err.is_configuration());
    assert!(err.root().is_driver_operation_failed());
    assert!(err.to_string().starts_with("delete House: "), "{err}");

    assert_eq!(db.row_count("house"), 1);
    assert!(house.read().id.is_some());
}

#[tokio::test]
async fn configuration_errors_leave_no_persisters() {
    let house = models::house().unwrap();
    let deed = EntityMapping::builder("deed", Deed::default)
        .auto_increment_id("id", |d: &Deed| d.id, |d, id| d.id = id)
        .one_to_one(
            "house",
            &house,
            |d: &Deed| d.house.clone(),
            |d, house| d.house = house,
            RelationConfig::new().cascade(CascadeMode::AssociationOnly),
        )
        .build()
        .unwrap();

    let err = Builder::new().build(&deed).unwrap_err();

    assert!(err.is_configuration());
    assert!(!err.is_store());
    assert!(err.root().is_invalid_mapping());
    assert!(err.to_string().contains("association-only"), "{err}");
}

#[derive(Debug, Default)]
struct Tag {
    id: Option<i64>,
    label: String,
}

fn tags(next: Arc<AtomicI64>) -> EntityPersister<Tag> {
    let tag = EntityMapping::builder("tag", Tag::default)
        .generated_id(
            "id",
            |t: &Tag| t.id,
            |t, id| t.id = id,
            move || next.load(Ordering::SeqCst),
        )
        .property("label", |t: &Tag| t.label.clone(), |t, label| t.label = label)
        .build()
        .unwrap();

    Builder::new().build_entity(&tag).unwrap()
}

#[tokio::test]
async fn failed_insert_leaves_the_generated_id_unset() {
    let mut db = TestDb::new();
    let next = Arc::new(AtomicI64::new(7));
    let tags = tags(next.clone());

    let first = shared(Tag {
        label: "first".to_string(),
        ..Tag::default()
    });
    tags.insert(&mut db.conn, &first).await.unwrap();

    // The generator hands out 7 again.
    let second = shared(Tag {
        label: "second".to_string(),
        ..Tag::default()
    });
    let err = tags.insert(&mut db.conn, &second).await.unwrap_err();
    assert!(err.is_store(), "{err}");
    assert!(second.read().id.is_none());

    // Still unsaved, so a retry writes the row.
    next.store(8, Ordering::SeqCst);
    tags.insert(&mut db.conn, &second).await.unwrap();
    assert_eq!(second.read().id, Some(8));
    assert_eq!(db.row_count("tag"), 2);
}

#[derive(Debug, Default)]
struct Shape {
    id: Option<i64>,
    name: String,
    radius: i32,
}

fn shapes() -> EntityPersister<Shape> {
    let circle = SubTypeBuilder::new("circle", |_: &Shape| true, Shape::default).property(
        "radius",
        |s: &Shape| s.radius,
        |s, radius| s.radius = radius,
    );

    let shape = EntityMapping::builder("shape", Shape::default)
        .auto_increment_id("id", |s: &Shape| s.id, |s, id| s.id = id)
        .property("name", |s: &Shape| s.name.clone(), |s, name| s.name = name)
        .polymorphism(PolymorphismBuilder::joined_tables().sub_type(circle))
        .build()
        .unwrap();

    Builder::new().build_entity(&shape).unwrap()
}

/// Forwards everything except inserts into one table.
#[derive(Debug)]
struct RefuseInserts {
    inner: trestle_driver_memory::Connection,
    table: &'static str,
}

#[async_trait]
impl Connection for RefuseInserts {
    fn capability(&self) -> &Capability {
        self.inner.capability()
    }

    async fn exec(&mut self, schema: &Arc<Schema>, op: Operation) -> Result<Response> {
        if let Operation::Insert(insert) = &op {
            if schema.table(insert.table).name == self.table {
                trestle::bail!("inserts into `{}` are refused", self.table);
            }
        }
        self.inner.exec(schema, op).await
    }
}

#[tokio::test]
async fn failed_sub_type_row_clears_the_store_assigned_id() {
    let db = TestDb::new();
    let shapes = shapes();
    let mut conn = RefuseInserts {
        inner: db.memory.connect(),
        table: "circle",
    };

    let disc = shared(Shape {
        name: "disc".to_string(),
        radius: 2,
        ..Shape::default()
    });
    let err = shapes.insert(&mut conn, &disc).await.unwrap_err();

    assert!(err.to_string().contains("inserts into `circle` are refused"), "{err}");
    // The parent row is left for the enclosing transaction to roll back.
    assert_eq!(db.row_count("shape"), 1);
    assert!(disc.read().id.is_none());
}
