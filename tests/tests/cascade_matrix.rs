use pretty_assertions::assert_eq;
use tests::{
    models::{self, Course, House, Owner, Person, Pet, Student},
    TestDb,
};
use trestle::{shared, stmt::Value, Builder, CascadeMode, EntityPersister, Shared};

fn persons(house: CascadeMode) -> (EntityPersister<Person>, EntityPersister<House>) {
    let models = models::person(house, CascadeMode::All).unwrap();
    let persisters = Builder::new().build(&models.person).unwrap();
    (
        persisters.root_entity().unwrap(),
        persisters.entity_for(&models.house).unwrap(),
    )
}

fn owners(cascade: CascadeMode) -> (EntityPersister<Owner>, EntityPersister<Pet>) {
    let models = models::owner(cascade).unwrap();
    let persisters = Builder::new().build(&models.owner).unwrap();
    (
        persisters.root_entity().unwrap(),
        persisters.entity_for(&models.pet).unwrap(),
    )
}

fn students(cascade: CascadeMode) -> (EntityPersister<Student>, EntityPersister<Course>) {
    let models = models::student(cascade).unwrap();
    let persisters = Builder::new().build(&models.student).unwrap();
    (
        persisters.root_entity().unwrap(),
        persisters.entity_for(&models.course).unwrap(),
    )
}

fn owner_with(name: &str, pets: &[&str]) -> Shared<Owner> {
    shared(Owner {
        pets: pets.iter().map(|pet| shared(Pet::named(pet))).collect(),
        ..Owner::named(name)
    })
}

fn student_with(name: &str, courses: &[Shared<Course>]) -> Shared<Student> {
    shared(Student {
        courses: courses.to_vec(),
        ..Student::named(name)
    })
}

fn id(owner: &Shared<Owner>) -> Value {
    Value::from(owner.read().id)
}

// Links stored in the owner's row.

#[tokio::test]
async fn source_owned_all_writes_targets_and_keeps_them() {
    let mut db = TestDb::new();
    let (persons, _) = persons(CascadeMode::All);

    let house = shared(House::at("1 Main St", "Springfield"));
    let alice = shared(Person {
        house: Some(house.clone()),
        ..Person::named("Alice")
    });
    persons.insert(&mut db.conn, &alice).await.unwrap();
    assert_eq!(db.row_count("house"), 1);

    let previous = shared(Person {
        id: alice.read().id,
        name: "Alice".to_string(),
        house: Some(shared(House {
            id: house.read().id,
            address: house.read().address.clone(),
        })),
        partner: None,
    });
    house.write().address.city = "Shelbyville".to_string();

    db.log.clear();
    persons
        .update(&mut db.conn, &alice, Some(&previous), false)
        .await
        .unwrap();

    // Only the house changed.
    assert_eq!(db.log.len(), 1);
    assert_eq!(
        db.column("house", "address_city"),
        [Value::from("Shelbyville")]
    );

    persons.delete(&mut db.conn, &alice).await.unwrap();
    assert_eq!(db.row_count("person"), 0);
    assert_eq!(db.row_count("house"), 1);
    assert!(house.read().id.is_some());
}

#[tokio::test]
async fn source_owned_orphan_removal_deletes_replaced_targets() {
    let mut db = TestDb::new();
    let (persons, _) = persons(CascadeMode::AllOrphanRemoval);

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
    let new = shared(House::at("9 Elm St", "Shelbyville"));
    alice.write().house = Some(new.clone());

    persons
        .update(&mut db.conn, &alice, Some(&previous), false)
        .await
        .unwrap();

    assert!(old.read().id.is_none());
    assert_eq!(db.column("house", "address_street"), [Value::from("9 Elm St")]);
    assert_eq!(
        db.column("person", "house_id"),
        [Value::from(new.read().id)]
    );
}

#[tokio::test]
async fn source_owned_read_only_never_writes_targets() {
    let mut db = TestDb::new();
    let (persons, houses) = persons(CascadeMode::ReadOnly);

    let house = shared(House::at("1 Main St", "Springfield"));
    let alice = shared(Person {
        house: Some(house.clone()),
        ..Person::named("Alice")
    });

    // An unsaved target is not inserted and the link is left empty.
    persons.insert(&mut db.conn, &alice).await.unwrap();
    assert_eq!(db.row_count("house"), 0);
    assert_eq!(db.column("person", "house_id"), [Value::Null]);
    assert!(house.read().id.is_none());

    houses.insert(&mut db.conn, &house).await.unwrap();
    house.write().address.city = "Shelbyville".to_string();

    let schema = persons.persisters().schema().clone();
    db.log.clear();
    persons.update(&mut db.conn, &alice, None, false).await.unwrap();

    // The link column follows the target; the target row is untouched.
    assert_eq!(db.log.writes_to(&schema, "house"), 0);
    assert_eq!(
        db.column("person", "house_id"),
        [Value::from(house.read().id)]
    );
    assert_eq!(
        db.column("house", "address_city"),
        [Value::from("Springfield")]
    );

    persons.delete(&mut db.conn, &alice).await.unwrap();
    assert_eq!(db.row_count("house"), 1);
}

// Links stored in the target's row.

#[tokio::test]
async fn target_owned_all_links_targets_and_cuts_on_delete() {
    let mut db = TestDb::new();
    let (owners, _) = owners(CascadeMode::All);

    let ann = owner_with("Ann", &["Rex", "Fido"]);
    owners.insert(&mut db.conn, &ann).await.unwrap();

    assert_eq!(db.column("pet", "owner_id"), [id(&ann), id(&ann)]);
    assert_eq!(db.column("pet", "position"), [Value::I32(0), Value::I32(1)]);

    owners.delete(&mut db.conn, &ann).await.unwrap();

    assert_eq!(db.row_count("owner"), 0);
    assert_eq!(db.column("pet", "name"), [Value::from("Rex"), Value::from("Fido")]);
    assert_eq!(db.column("pet", "owner_id"), [Value::Null, Value::Null]);
    assert_eq!(db.column("pet", "position"), [Value::Null, Value::Null]);
}

#[tokio::test]
async fn target_owned_orphan_removal_deletes_targets_with_the_owner() {
    let mut db = TestDb::new();
    let (owners, _) = owners(CascadeMode::AllOrphanRemoval);

    let ann = owner_with("Ann", &["Rex", "Fido"]);
    owners.insert(&mut db.conn, &ann).await.unwrap();
    owners.delete(&mut db.conn, &ann).await.unwrap();

    assert_eq!(db.row_count("owner"), 0);
    assert_eq!(db.row_count("pet"), 0);
    for pet in &ann.read().pets {
        assert!(pet.read().id.is_none());
    }
}

#[tokio::test]
async fn target_owned_read_only_leaves_targets_alone() {
    let mut db = TestDb::new();
    let (owners, pets) = owners(CascadeMode::ReadOnly);

    let rex = shared(Pet::named("Rex"));
    pets.insert(&mut db.conn, &rex).await.unwrap();

    let ann = shared(Owner {
        pets: vec![rex.clone(), shared(Pet::named("Fido"))],
        ..Owner::named("Ann")
    });
    owners.insert(&mut db.conn, &ann).await.unwrap();

    assert_eq!(db.row_count("pet"), 1);
    assert_eq!(db.column("pet", "owner_id"), [Value::Null]);

    owners.delete(&mut db.conn, &ann).await.unwrap();
    assert_eq!(db.row_count("pet"), 1);
}

// Links stored in an association table.

#[tokio::test]
async fn association_all_writes_targets_and_links() {
    let mut db = TestDb::new();
    let (students, _) = students(CascadeMode::All);

    let math = shared(Course::titled("Math"));
    let art = shared(Course::titled("Art"));
    let sam = student_with("Sam", &[math.clone(), art.clone()]);
    students.insert(&mut db.conn, &sam).await.unwrap();

    let sam_id = Value::from(sam.read().id);
    assert_eq!(db.row_count("course"), 2);
    assert_eq!(
        db.rows("student_courses"),
        [
            vec![sam_id.clone(), Value::from(math.read().id)],
            vec![sam_id.clone(), Value::from(art.read().id)],
        ]
    );

    students.delete(&mut db.conn, &sam).await.unwrap();
    assert_eq!(db.row_count("student"), 0);
    assert_eq!(db.row_count("student_courses"), 0);
    assert_eq!(db.row_count("course"), 2);
}

#[tokio::test]
async fn association_orphan_removal_deletes_unlinked_targets() {
    let mut db = TestDb::new();
    let (students, _) = students(CascadeMode::AllOrphanRemoval);

    let math = shared(Course::titled("Math"));
    let art = shared(Course::titled("Art"));
    let sam = student_with("Sam", &[math.clone(), art.clone()]);
    students.insert(&mut db.conn, &sam).await.unwrap();

    let previous = student_with("Sam", &[math.clone(), art.clone()]);
    previous.write().id = sam.read().id;
    sam.write().courses = vec![art.clone()];

    students
        .update(&mut db.conn, &sam, Some(&previous), false)
        .await
        .unwrap();

    assert_eq!(db.column("course", "title"), [Value::from("Art")]);
    assert_eq!(db.row_count("student_courses"), 1);
    assert!(math.read().id.is_none());

    students.delete(&mut db.conn, &sam).await.unwrap();
    assert_eq!(db.row_count("course"), 0);
    assert_eq!(db.row_count("student_courses"), 0);
}

#[tokio::test]
async fn association_read_only_writes_nothing() {
    let mut db = TestDb::new();
    let (students, courses) = students(CascadeMode::ReadOnly);

    let math = shared(Course::titled("Math"));
    courses.insert(&mut db.conn, &math).await.unwrap();

    let sam = student_with("Sam", &[math.clone(), shared(Course::titled("Art"))]);
    students.insert(&mut db.conn, &sam).await.unwrap();

    assert_eq!(db.row_count("student"), 1);
    assert_eq!(db.row_count("course"), 1);
    assert_eq!(db.row_count("student_courses"), 0);
}

#[tokio::test]
async fn association_only_links_persisted_targets() {
    let mut db = TestDb::new();
    let (students, courses) = students(CascadeMode::AssociationOnly);

    let math = shared(Course::titled("Math"));
    courses.insert(&mut db.conn, &math).await.unwrap();
    math.write().title = "Mathematics".to_string();

    let sam = student_with("Sam", &[math.clone()]);
    students.insert(&mut db.conn, &sam).await.unwrap();

    assert_eq!(db.row_count("student_courses"), 1);
    assert_eq!(db.column("course", "title"), [Value::from("Math")]);

    students.delete(&mut db.conn, &sam).await.unwrap();
    assert_eq!(db.row_count("student_courses"), 0);
    assert_eq!(db.row_count("course"), 1);
}

#[tokio::test]
async fn association_only_refuses_unsaved_targets() {
    let mut db = TestDb::new();
    let (students, _) = students(CascadeMode::AssociationOnly);

    let sam = student_with("Sam", &[shared(Course::titled("Math"))]);
    let err = students.insert(&mut db.conn, &sam).await.unwrap_err();

    assert!(err.to_string().contains("does not insert its targets"));
    assert_eq!(db.row_count("course"), 0);
    assert_eq!(db.row_count("student_courses"), 0);
}
