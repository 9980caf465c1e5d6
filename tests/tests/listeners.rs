use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tests::{
    models::{self, House, Person},
    TestDb,
};
use trestle::{
    shared, stmt::Value, Builder, CascadeMode, EntityPersister, EntityRef, Listener, Result,
};

type Events = Arc<Mutex<Vec<String>>>;

/// Records every hook as `label.hook(count)`.
struct Recorder {
    label: &'static str,
    events: Events,
}

impl Recorder {
    fn push(&self, hook: &str, count: usize) {
        self.events
            .lock()
            .push(format!("{}.{hook}({count})", self.label));
    }
}

impl Listener for Recorder {
    fn before_insert(&self, entities: &[EntityRef]) -> Result<()> {
        self.push("before_insert", entities.len());
        Ok(())
    }

    fn after_insert(&self, entities: &[EntityRef]) -> Result<()> {
        self.push("after_insert", entities.len());
        Ok(())
    }

    fn before_update(&self, entities: &[(EntityRef, Option<EntityRef>)]) -> Result<()> {
        self.push("before_update", entities.len());
        Ok(())
    }

    fn after_update(&self, entities: &[(EntityRef, Option<EntityRef>)]) -> Result<()> {
        self.push("after_update", entities.len());
        Ok(())
    }

    fn before_delete(&self, entities: &[EntityRef]) -> Result<()> {
        self.push("before_delete", entities.len());
        Ok(())
    }

    fn after_delete(&self, entities: &[EntityRef]) -> Result<()> {
        self.push("after_delete", entities.len());
        Ok(())
    }

    fn before_select(&self, ids: &[Value]) -> Result<()> {
        self.push("before_select", ids.len());
        Ok(())
    }

    fn after_select(&self, entities: &[EntityRef]) -> Result<()> {
        self.push("after_select", entities.len());
        Ok(())
    }
}

/// Fails every insert and delete hook.
struct Failing;

impl Listener for Failing {
    fn before_insert(&self, _: &[EntityRef]) -> Result<()> {
        trestle::bail!("before_insert failed")
    }

    fn after_insert(&self, _: &[EntityRef]) -> Result<()> {
        trestle::bail!("after_insert failed")
    }

    fn before_delete(&self, _: &[EntityRef]) -> Result<()> {
        trestle::bail!("before_delete failed")
    }

    fn after_delete(&self, _: &[EntityRef]) -> Result<()> {
        trestle::bail!("after_delete failed")
    }
}

fn recorded() -> (EntityPersister<Person>, Events) {
    let models = models::person(CascadeMode::AllOrphanRemoval, CascadeMode::All).unwrap();
    let persisters = Builder::new().build(&models.person).unwrap();
    let persons: EntityPersister<Person> = persisters.root_entity().unwrap();
    let houses: EntityPersister<House> = persisters.entity_for(&models.house).unwrap();

    let events = Events::default();
    persons.add_listener(Arc::new(Recorder {
        label: "person",
        events: events.clone(),
    }));
    houses.add_listener(Arc::new(Recorder {
        label: "house",
        events: events.clone(),
    }));

    (persons, events)
}

fn drain(events: &Events) -> Vec<String> {
    std::mem::take(&mut *events.lock())
}

#[tokio::test]
async fn hooks_wrap_every_operation() {
    let mut db = TestDb::new();
    let (persons, events) = recorded();

    let alice = shared(Person {
        house: Some(shared(House::at("1 Main St", "Springfield"))),
        ..Person::named("Alice")
    });

    persons.insert(&mut db.conn, &alice).await.unwrap();
    assert_eq!(
        drain(&events),
        [
            "person.before_insert(1)",
            "house.before_insert(1)",
            "house.after_insert(1)",
            "person.after_insert(1)",
        ]
    );

    let id = alice.read().id;
    persons.select(&mut db.conn, id).await.unwrap().unwrap();
    assert_eq!(
        drain(&events),
        ["person.before_select(1)", "person.after_select(1)"]
    );

    alice.write().name = "Alicia".to_string();
    persons.update(&mut db.conn, &alice, None, false).await.unwrap();
    assert_eq!(
        drain(&events),
        [
            "person.before_update(1)",
            "house.before_update(1)",
            "house.after_update(1)",
            "person.after_update(1)",
        ]
    );

    persons.delete(&mut db.conn, &alice).await.unwrap();
    assert_eq!(
        drain(&events),
        [
            "person.before_delete(1)",
            "house.before_delete(1)",
            "house.after_delete(1)",
            "person.after_delete(1)",
        ]
    );
}

#[tokio::test]
async fn listeners_see_identifiers_assigned_by_the_insert() {
    struct Ids(Arc<Mutex<Vec<Option<i64>>>>);

    impl Listener for Ids {
        fn before_insert(&self, entities: &[EntityRef]) -> Result<()> {
            for entity in entities {
                self.0.lock().push(entity.read(|person: &Person| person.id)?);
            }
            Ok(())
        }

        fn after_insert(&self, entities: &[EntityRef]) -> Result<()> {
            self.before_insert(entities)
        }
    }

    let mut db = TestDb::new();
    let models = models::person(CascadeMode::All, CascadeMode::All).unwrap();
    let persons: EntityPersister<Person> = Builder::new().build_entity(&models.person).unwrap();

    let seen = Arc::new(Mutex::new(vec![]));
    persons.add_listener(Arc::new(Ids(seen.clone())));

    let alice = shared(Person::named("Alice"));
    persons.insert(&mut db.conn, &alice).await.unwrap();

    assert_eq!(*seen.lock(), [None, alice.read().id]);
}

#[tokio::test]
async fn listeners_run_in_registration_order() {
    let mut db = TestDb::new();
    let models = models::person(CascadeMode::All, CascadeMode::All).unwrap();
    let persons: EntityPersister<Person> = Builder::new().build_entity(&models.person).unwrap();

    let events = Events::default();
    for label in ["first", "second"] {
        persons.add_listener(Arc::new(Recorder {
            label,
            events: events.clone(),
        }));
    }

    persons
        .insert_all(
            &mut db.conn,
            &[shared(Person::named("Alice")), shared(Person::named("Bob"))],
        )
        .await
        .unwrap();

    assert_eq!(
        drain(&events),
        [
            "first.before_insert(2)",
            "second.before_insert(2)",
            "first.after_insert(2)",
            "second.after_insert(2)",
        ]
    );
}

#[tokio::test]
async fn failing_hooks_do_not_change_the_outcome() {
    let mut db = TestDb::new();
    let models = models::person(CascadeMode::AllOrphanRemoval, CascadeMode::All).unwrap();
    let persons: EntityPersister<Person> = Builder::new().build_entity(&models.person).unwrap();

    let events = Events::default();
    persons.add_listener(Arc::new(Failing));
    persons.add_listener(Arc::new(Recorder {
        label: "person",
        events: events.clone(),
    }));

    let alice = shared(Person {
        house: Some(shared(House::at("1 Main St", "Springfield"))),
        ..Person::named("Alice")
    });
    persons.insert(&mut db.conn, &alice).await.unwrap();

    assert!(alice.read().id.is_some());
    assert_eq!(db.row_count("person"), 1);
    assert_eq!(db.row_count("house"), 1);

    persons.delete(&mut db.conn, &alice).await.unwrap();

    assert!(alice.read().id.is_none());
    assert_eq!(db.row_count("person"), 0);
    assert_eq!(db.row_count("house"), 0);

    // Listeners after the failing one still see every hook.
    assert_eq!(
        drain(&events),
        [
            "person.before_insert(1)",
            "person.after_insert(1)",
            "person.before_delete(1)",
            "person.after_delete(1)",
        ]
    );
}
