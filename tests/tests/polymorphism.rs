use pretty_assertions::assert_eq;
use tests::{
    models::{self, Body, Garage, Scheme, Vehicle},
    TestDb,
};
use trestle::{shared, Builder, EntityPersister, Shared};

fn vehicles(scheme: Scheme) -> EntityPersister<Vehicle> {
    Builder::new()
        .build_entity(&models::vehicle(scheme).unwrap())
        .unwrap()
}

fn describe(vehicles: &[Shared<Vehicle>]) -> Vec<(String, Body)> {
    let mut described = vehicles
        .iter()
        .map(|vehicle| {
            let vehicle = vehicle.read();
            (vehicle.name.clone(), vehicle.body.clone())
        })
        .collect::<Vec<_>>();
    described.sort_by(|a, b| a.0.cmp(&b.0));
    described
}

/// Tables holding a row for each sub-type, in the order rows are written.
fn tables(scheme: Scheme) -> (&'static [&'static str], &'static [&'static str]) {
    match scheme {
        Scheme::SingleTable => (&["vehicle"], &["vehicle"]),
        Scheme::JoinedTables | Scheme::JoinedTablesWithDiscriminator => {
            (&["vehicle", "car"], &["vehicle", "truck"])
        }
        Scheme::TablePerClass => (&["car"], &["truck"]),
    }
}

#[tokio::test]
async fn sub_types_round_trip() {
    for scheme in Scheme::ALL {
        let mut db = TestDb::new();
        let vehicles = vehicles(scheme);

        let beetle = shared(Vehicle::car("Beetle", 4));
        let hauler = shared(Vehicle::truck("Hauler", 9000));
        vehicles
            .insert_all(&mut db.conn, &[beetle.clone(), hauler.clone()])
            .await
            .unwrap();

        let (car_tables, truck_tables) = tables(scheme);
        for table in car_tables.iter().chain(truck_tables) {
            assert!(db.row_count(table) >= 1, "{scheme:?}: no row in `{table}`");
        }

        let id = beetle.read().id;
        let loaded = vehicles.select(&mut db.conn, id).await.unwrap().unwrap();
        assert_eq!(loaded.read().name, "Beetle", "{scheme:?}");
        assert_eq!(loaded.read().body, Body::Car { seats: 4 }, "{scheme:?}");

        let all = vehicles.select_all(&mut db.conn).await.unwrap();
        assert_eq!(
            describe(&all),
            [
                ("Beetle".to_string(), Body::Car { seats: 4 }),
                ("Hauler".to_string(), Body::Truck { payload: 9000 }),
            ],
            "{scheme:?}"
        );
    }
}

#[tokio::test]
async fn sub_type_columns_are_updated_in_their_table() {
    for scheme in Scheme::ALL {
        let mut db = TestDb::new();
        let vehicles = vehicles(scheme);
        let schema = vehicles.persisters().schema().clone();

        let hauler = shared(Vehicle::truck("Hauler", 9000));
        vehicles.insert(&mut db.conn, &hauler).await.unwrap();

        let previous = shared(Vehicle {
            id: hauler.read().id,
            ..Vehicle::truck("Hauler", 9000)
        });
        hauler.write().body = Body::Truck { payload: 12000 };

        db.log.clear();
        vehicles
            .update(&mut db.conn, &hauler, Some(&previous), false)
            .await
            .unwrap();

        // Only the table holding `payload` is written.
        let payload_table = match scheme {
            Scheme::SingleTable => "vehicle",
            _ => "truck",
        };
        assert_eq!(db.log.len(), 1, "{scheme:?}");
        assert_eq!(db.log.writes_to(&schema, payload_table), 1, "{scheme:?}");

        let id = hauler.read().id;
        let loaded = vehicles.select(&mut db.conn, id).await.unwrap().unwrap();
        assert_eq!(loaded.read().body, Body::Truck { payload: 12000 }, "{scheme:?}");
    }
}

#[tokio::test]
async fn deleting_removes_every_row_of_the_entity() {
    for scheme in Scheme::ALL {
        let mut db = TestDb::new();
        let vehicles = vehicles(scheme);

        let beetle = shared(Vehicle::car("Beetle", 4));
        vehicles.insert(&mut db.conn, &beetle).await.unwrap();
        let id = beetle.read().id;

        vehicles.delete(&mut db.conn, &beetle).await.unwrap();

        let (car_tables, _) = tables(scheme);
        for table in car_tables {
            assert_eq!(db.row_count(table), 0, "{scheme:?}: `{table}`");
        }
        assert!(beetle.read().id.is_none());
        assert!(vehicles.select(&mut db.conn, id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn changing_the_sub_type_is_unsupported() {
    for scheme in Scheme::ALL {
        let mut db = TestDb::new();
        let vehicles = vehicles(scheme);

        let beetle = shared(Vehicle::car("Beetle", 4));
        vehicles.insert(&mut db.conn, &beetle).await.unwrap();

        let previous = shared(Vehicle {
            id: beetle.read().id,
            ..Vehicle::car("Beetle", 4)
        });
        beetle.write().body = Body::Truck { payload: 1 };

        let err = vehicles
            .update(&mut db.conn, &beetle, Some(&previous), false)
            .await
            .unwrap_err();
        assert!(err.is_unsupported_feature(), "{scheme:?}: {err}");
    }
}

#[tokio::test]
async fn polymorphic_targets_load_through_relations() {
    for scheme in Scheme::ALL {
        let mut db = TestDb::new();
        let models = models::garage(scheme).unwrap();
        let garages: EntityPersister<Garage> =
            Builder::new().build_entity(&models.garage).unwrap();

        let garage = shared(Garage {
            id: None,
            name: "Central".to_string(),
            vehicles: vec![
                shared(Vehicle::truck("Hauler", 9000)),
                shared(Vehicle::car("Beetle", 4)),
            ],
        });
        garages.insert(&mut db.conn, &garage).await.unwrap();
        assert_eq!(db.row_count("garage_vehicles"), 2, "{scheme:?}");

        let id = garage.read().id;
        let loaded = garages.select(&mut db.conn, id).await.unwrap().unwrap();
        let loaded = loaded.read();

        assert_eq!(loaded.name, "Central");
        assert_eq!(
            describe(&loaded.vehicles),
            [
                ("Beetle".to_string(), Body::Car { seats: 4 }),
                ("Hauler".to_string(), Body::Truck { payload: 9000 }),
            ],
            "{scheme:?}"
        );
    }
}

#[tokio::test]
async fn table_per_class_relations_are_always_deferred() {
    let models = models::garage(Scheme::TablePerClass).unwrap();
    let persisters = Builder::new().build(&models.garage).unwrap();
    let garage = persisters.persister(persisters.root());

    assert!(garage.join_tree().joined_paths().is_empty());
    assert_eq!(garage.join_tree().deferred_paths(), ["vehicles"]);

    let models = models::garage(Scheme::JoinedTables).unwrap();
    let persisters = Builder::new().build(&models.garage).unwrap();
    let garage = persisters.persister(persisters.root());

    assert_eq!(garage.join_tree().joined_paths(), ["vehicles"]);
}
