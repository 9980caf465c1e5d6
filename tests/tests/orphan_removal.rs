use pretty_assertions::assert_eq;
use tests::{
    models::{self, Course, House, Owner, Person, Pet, Student},
    TestDb,
};
use trestle::{shared, stmt::Value, Builder, CascadeMode, EntityPersister, Shared};

fn snapshot_owner(owner: &Shared<Owner>) -> Shared<Owner> {
    let owner = owner.read();
    shared(Owner {
        id: owner.id,
        name: owner.name.clone(),
        pets: owner.pets.clone(),
    })
}

#[tokio::test]
async fn repeating_a_source_owned_update_is_harmless() {
    let mut db = TestDb::new();
    let models = models::person(CascadeMode::AllOrphanRemoval, CascadeMode::All).unwrap();
    let persons: EntityPersister<Person> = Builder::new().build_entity(&models.person).unwrap();

    let old = shared(House::at("1 Main St", "Springfield"));
    let alice = shared(Person {
        house: Some(old.clone()),
        ..Person::named("Alice")
    });
    persons.insert(&mut db.conn, &alice).await.unwrap();

    let previous = shared(Person {
        id: alice.read().id,
        name: "Alice".to_string(),
        house: Some(old.clone()),
        partner: None,
    });
    alice.write().house = Some(shared(House::at("9 Elm St", "Shelbyville")));

    persons
        .update(&mut db.conn, &alice, Some(&previous), false)
        .await
        .unwrap();
    let after_first = (db.rows("person"), db.rows("house"));

    let schema = persons.persisters().schema().clone();
    db.log.clear();
    persons
        .update(&mut db.conn, &alice, Some(&previous), false)
        .await
        .unwrap();

    assert_eq!(db.log.deletes_from(&schema, "house"), 0);
    assert_eq!((db.rows("person"), db.rows("house")), after_first);
}

#[tokio::test]
async fn repeating_a_target_owned_update_is_harmless() {
    let mut db = TestDb::new();
    let models = models::owner(CascadeMode::AllOrphanRemoval).unwrap();
    let owners: EntityPersister<Owner> = Builder::new().build_entity(&models.owner).unwrap();

    let ann = shared(Owner {
        pets: vec![shared(Pet::named("Rex")), shared(Pet::named("Fido"))],
        ..Owner::named("Ann")
    });
    owners.insert(&mut db.conn, &ann).await.unwrap();

    let previous = snapshot_owner(&ann);
    let rex = ann.write().pets.remove(0);

    owners
        .update(&mut db.conn, &ann, Some(&previous), false)
        .await
        .unwrap();

    assert!(rex.read().id.is_none());
    assert_eq!(db.column("pet", "name"), [Value::from("Fido")]);
    assert_eq!(db.column("pet", "position"), [Value::I32(0)]);
    let after_first = db.rows("pet");

    let schema = owners.persisters().schema().clone();
    db.log.clear();
    owners
        .update(&mut db.conn, &ann, Some(&previous), false)
        .await
        .unwrap();

    assert_eq!(db.log.deletes_from(&schema, "pet"), 0);
    assert_eq!(db.rows("pet"), after_first);
}

#[tokio::test]
async fn repeating_an_association_update_is_harmless() {
    let mut db = TestDb::new();
    let models = models::student(CascadeMode::AllOrphanRemoval).unwrap();
    let students: EntityPersister<Student> =
        Builder::new().build_entity(&models.student).unwrap();

    let math = shared(Course::titled("Math"));
    let sam = shared(Student {
        courses: vec![math.clone(), shared(Course::titled("Art"))],
        ..Student::named("Sam")
    });
    students.insert(&mut db.conn, &sam).await.unwrap();

    let previous = shared(Student {
        id: sam.read().id,
        name: "Sam".to_string(),
        courses: sam.read().courses.clone(),
    });
    sam.write().courses.remove(0);

    students
        .update(&mut db.conn, &sam, Some(&previous), false)
        .await
        .unwrap();
    let after_first = (db.rows("course"), db.rows("student_courses"));
    assert_eq!(after_first.0.len(), 1);
    assert_eq!(after_first.1.len(), 1);

    students
        .update(&mut db.conn, &sam, Some(&previous), false)
        .await
        .unwrap();
    assert_eq!((db.rows("course"), db.rows("student_courses")), after_first);
    assert!(math.read().id.is_none());
}

#[tokio::test]
async fn removed_target_without_orphan_removal_is_unlinked() {
    let mut db = TestDb::new();
    let models = models::owner(CascadeMode::All).unwrap();
    let owners: EntityPersister<Owner> = Builder::new().build_entity(&models.owner).unwrap();

    let ann = shared(Owner {
        pets: vec![shared(Pet::named("Rex")), shared(Pet::named("Fido"))],
        ..Owner::named("Ann")
    });
    owners.insert(&mut db.conn, &ann).await.unwrap();

    let previous = snapshot_owner(&ann);
    let rex = ann.write().pets.remove(0);

    owners
        .update(&mut db.conn, &ann, Some(&previous), false)
        .await
        .unwrap();

    let ann_id = Value::from(ann.read().id);
    assert!(rex.read().id.is_some());
    assert_eq!(db.column("pet", "owner_id"), [Value::Null, ann_id]);
    assert_eq!(db.column("pet", "position"), [Value::Null, Value::I32(0)]);
}

#[tokio::test]
async fn target_moved_to_another_owner_keeps_its_new_link() {
    let mut db = TestDb::new();
    let models = models::owner(CascadeMode::All).unwrap();
    let owners: EntityPersister<Owner> = Builder::new().build_entity(&models.owner).unwrap();

    let rex = shared(Pet::named("Rex"));
    let ann = shared(Owner {
        pets: vec![rex.clone()],
        ..Owner::named("Ann")
    });
    let ben = shared(Owner::named("Ben"));
    owners
        .insert_all(&mut db.conn, &[ann.clone(), ben.clone()])
        .await
        .unwrap();

    let ann_before = snapshot_owner(&ann);
    let ben_before = snapshot_owner(&ben);
    ann.write().pets.clear();
    ben.write().pets.push(rex.clone());

    // Ben is written first, then Ann drops Rex: the unlink must not undo
    // Ben's claim.
    owners
        .update_all(
            &mut db.conn,
            &[
                (ben.clone(), Some(ben_before)),
                (ann.clone(), Some(ann_before)),
            ],
            false,
        )
        .await
        .unwrap();

    let ben_id = ben.read().id;
    assert_eq!(db.column("pet", "owner_id"), [Value::from(ben_id)]);

    let loaded = owners
        .select(&mut db.conn, ben_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.read().pets.len(), 1);
    assert_eq!(loaded.read().pets[0].read().name, "Rex");
}
