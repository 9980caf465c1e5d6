//! Entity types and their mappings shared by the integration tests.

use std::sync::Arc;
use trestle::{
    CascadeMode, EmbeddedBuilder, EntityMapping, MappingProvider, PolymorphismBuilder,
    RelationConfig, Result, Shared, SubTypeBuilder,
};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct Person {
    pub id: Option<i64>,
    pub name: String,
    pub house: Option<Shared<House>>,
    pub partner: Option<Shared<Person>>,
}

#[derive(Debug, Default)]
pub struct House {
    pub id: Option<i64>,
    pub address: Address,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: String,
}

impl Person {
    pub fn named(name: &str) -> Person {
        Person {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl House {
    pub fn at(street: &str, city: &str) -> House {
        House {
            id: None,
            address: Address {
                street: street.to_string(),
                city: city.to_string(),
            },
        }
    }
}

pub struct PersonModels {
    pub person: Arc<EntityMapping>,
    pub house: Arc<EntityMapping>,
}

pub fn house() -> Result<Arc<EntityMapping>> {
    EntityMapping::builder("house", House::default)
        .auto_increment_id("id", |h: &House| h.id, |h, id| h.id = id)
        .embed(
            "address",
            |h| &h.address,
            |h| &mut h.address,
            EmbeddedBuilder::new()
                .property("street", |a: &Address| a.street.clone(), |a, v| a.street = v)
                .property("city", |a: &Address| a.city.clone(), |a, v| a.city = v),
        )
        .build()
}

/// A person owning at most one house and pointing at another person. Both
/// links are stored in the `person` table.
pub fn person(house_cascade: CascadeMode, partner_cascade: CascadeMode) -> Result<PersonModels> {
    let house = house()?;
    let slot = MappingProvider::new();

    let person = EntityMapping::builder("person", Person::default)
        .auto_increment_id("id", |p: &Person| p.id, |p, id| p.id = id)
        .property("name", |p: &Person| p.name.clone(), |p, name| p.name = name)
        .one_to_one(
            "house",
            &house,
            |p: &Person| p.house.clone(),
            |p, house| p.house = house,
            RelationConfig::new().cascade(house_cascade),
        )
        .one_to_one(
            "partner",
            &slot,
            |p: &Person| p.partner.clone(),
            |p, partner| p.partner = partner,
            RelationConfig::new().cascade(partner_cascade),
        )
        .build()?;

    slot.fill(person.clone())?;

    Ok(PersonModels { person, house })
}

#[derive(Debug, Default)]
pub struct Owner {
    pub id: Option<i64>,
    pub name: String,
    pub pets: Vec<Shared<Pet>>,
}

#[derive(Debug, Default)]
pub struct Pet {
    pub id: Option<i64>,
    pub name: String,
    pub owner: Option<Shared<Owner>>,
}

impl Owner {
    pub fn named(name: &str) -> Owner {
        Owner {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Pet {
    pub fn named(name: &str) -> Pet {
        Pet {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

pub struct OwnerModels {
    pub owner: Arc<EntityMapping>,
    pub pet: Arc<EntityMapping>,
}

/// Owners with an ordered collection of pets. The pair shares the
/// `pet.owner_id` column; the element position is kept in `pet.position`.
pub fn owner(cascade: CascadeMode) -> Result<OwnerModels> {
    let slot = MappingProvider::new();

    let pet = EntityMapping::builder("pet", Pet::default)
        .auto_increment_id("id", |p: &Pet| p.id, |p, id| p.id = id)
        .property("name", |p: &Pet| p.name.clone(), |p, name| p.name = name)
        .one_to_one(
            "owner",
            &slot,
            |p: &Pet| p.owner.clone(),
            |p, owner| p.owner = owner,
            RelationConfig::new()
                .pair("pets")
                .cascade(CascadeMode::ReadOnly),
        )
        .build()?;

    let owner = EntityMapping::builder("owner", Owner::default)
        .auto_increment_id("id", |o: &Owner| o.id, |o, id| o.id = id)
        .property("name", |o: &Owner| o.name.clone(), |o, name| o.name = name)
        .one_to_many(
            "pets",
            &pet,
            |o: &Owner| o.pets.clone(),
            |o, pets| o.pets = pets,
            RelationConfig::new()
                .pair("owner")
                .index_column("position")
                .cascade(cascade),
        )
        .build()?;

    slot.fill(owner.clone())?;

    Ok(OwnerModels { owner, pet })
}

#[derive(Debug, Default)]
pub struct Student {
    pub id: Option<Uuid>,
    pub name: String,
    pub courses: Vec<Shared<Course>>,
}

#[derive(Debug, Default)]
pub struct Course {
    pub id: Option<i64>,
    pub title: String,
}

impl Student {
    pub fn named(name: &str) -> Student {
        Student {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Course {
    pub fn titled(title: &str) -> Course {
        Course {
            id: None,
            title: title.to_string(),
        }
    }
}

pub struct StudentModels {
    pub student: Arc<EntityMapping>,
    pub course: Arc<EntityMapping>,
}

pub fn course() -> Result<Arc<EntityMapping>> {
    EntityMapping::builder("course", Course::default)
        .auto_increment_id("id", |c: &Course| c.id, |c, id| c.id = id)
        .property("title", |c: &Course| c.title.clone(), |c, title| c.title = title)
        .build()
}

/// Students enrolled in courses through the `student_courses` table.
pub fn student(cascade: CascadeMode) -> Result<StudentModels> {
    let course = course()?;

    let student = EntityMapping::builder("student", Student::default)
        .generated_id("id", |s: &Student| s.id, |s, id| s.id = id, Uuid::new_v4)
        .property("name", |s: &Student| s.name.clone(), |s, name| s.name = name)
        .many_to_many(
            "courses",
            &course,
            |s: &Student| s.courses.clone(),
            |s, courses| s.courses = courses,
            RelationConfig::new().association_table().cascade(cascade),
        )
        .build()?;

    Ok(StudentModels { student, course })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Car { seats: i32 },
    Truck { payload: i64 },
}

#[derive(Debug)]
pub struct Vehicle {
    pub id: Option<Uuid>,
    pub name: String,
    pub body: Body,
}

impl Vehicle {
    pub fn car(name: &str, seats: i32) -> Vehicle {
        Vehicle {
            id: None,
            name: name.to_string(),
            body: Body::Car { seats },
        }
    }

    pub fn truck(name: &str, payload: i64) -> Vehicle {
        Vehicle {
            id: None,
            name: name.to_string(),
            body: Body::Truck { payload },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    SingleTable,
    JoinedTables,
    JoinedTablesWithDiscriminator,
    TablePerClass,
}

impl Scheme {
    pub const ALL: [Scheme; 4] = [
        Scheme::SingleTable,
        Scheme::JoinedTables,
        Scheme::JoinedTablesWithDiscriminator,
        Scheme::TablePerClass,
    ];
}

/// Cars and trucks stored with `scheme`.
pub fn vehicle(scheme: Scheme) -> Result<Arc<EntityMapping>> {
    let polymorphism = match scheme {
        Scheme::SingleTable => PolymorphismBuilder::single_table("kind"),
        Scheme::JoinedTables => PolymorphismBuilder::joined_tables(),
        Scheme::JoinedTablesWithDiscriminator => {
            PolymorphismBuilder::joined_tables_with_discriminator("kind")
        }
        Scheme::TablePerClass => PolymorphismBuilder::table_per_class(),
    };

    let car = SubTypeBuilder::new(
        "car",
        |v: &Vehicle| matches!(v.body, Body::Car { .. }),
        || Vehicle::car("", 0),
    )
    .property(
        "seats",
        |v: &Vehicle| match v.body {
            Body::Car { seats } => seats,
            Body::Truck { .. } => 0,
        },
        |v, seats| v.body = Body::Car { seats },
    );

    let truck = SubTypeBuilder::new(
        "truck",
        |v: &Vehicle| matches!(v.body, Body::Truck { .. }),
        || Vehicle::truck("", 0),
    )
    .property(
        "payload",
        |v: &Vehicle| match v.body {
            Body::Truck { payload } => payload,
            Body::Car { .. } => 0,
        },
        |v, payload| v.body = Body::Truck { payload },
    );

    EntityMapping::builder("vehicle", || Vehicle::car("", 0))
        .generated_id("id", |v: &Vehicle| v.id, |v, id| v.id = id, Uuid::new_v4)
        .property("name", |v: &Vehicle| v.name.clone(), |v, name| v.name = name)
        .polymorphism(polymorphism.sub_type(car).sub_type(truck))
        .build()
}

#[derive(Debug, Default)]
pub struct Garage {
    pub id: Option<i64>,
    pub name: String,
    pub vehicles: Vec<Shared<Vehicle>>,
}

pub struct GarageModels {
    pub garage: Arc<EntityMapping>,
    pub vehicle: Arc<EntityMapping>,
}

/// Garages parking polymorphic vehicles, linked through `garage_vehicles`.
pub fn garage(scheme: Scheme) -> Result<GarageModels> {
    let vehicle = vehicle(scheme)?;

    let garage = EntityMapping::builder("garage", Garage::default)
        .auto_increment_id("id", |g: &Garage| g.id, |g, id| g.id = id)
        .property("name", |g: &Garage| g.name.clone(), |g, name| g.name = name)
        .one_to_many(
            "vehicles",
            &vehicle,
            |g: &Garage| g.vehicles.clone(),
            |g, vehicles| g.vehicles = vehicles,
            RelationConfig::new().cascade(CascadeMode::All),
        )
        .build()?;

    Ok(GarageModels { garage, vehicle })
}
