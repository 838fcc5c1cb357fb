use linesdb::Database;
use serde_json::{json, Value};

fn seed() -> Vec<Value> {
    vec![
        json!({"model": "Project", "id": 1, "title": "Project Aha"}),
        json!({"model": "Project", "id": 2, "title": "Project bac"}),
        json!({"model": "Project", "id": 3, "title": "Project omm"}),
        json!({"model": "Project", "id": 4, "title": "Project sup"}),
        json!({"model": "TimeEvent", "id": 1, "projectId": 1, "description": "Working a"}),
        json!({"model": "TimeEvent", "id": 2, "projectId": 1, "description": "Working b"}),
        json!({"model": "TimeEvent", "id": 3, "projectId": 2, "description": "Working c"}),
        json!({"model": "TimeEvent", "id": 4, "projectId": 2, "description": "Working d"}),
        json!({"model": "TimeEvent", "id": 5, "projectId": 2, "description": "Working e"}),
        json!({"model": "TimeEvent", "id": 6, "projectId": 3, "description": "Working f"}),
        json!({"model": "TimeEvent", "id": 7, "projectId": 3, "description": "Working g"}),
        json!({"model": "TimeEvent", "id": 8, "projectId": 4, "description": "Working h"}),
    ]
}

fn main() -> linesdb::Result<()> {
    env_logger::init();
    log::info!("Starting time-tracking demo");

    // Initialize the database and associate the model schemas
    let db = Database::from_records(&seed())?;
    db.register_model("Project", &json!({ "title": "string" }))?;
    db.register_model(
        "TimeEvent",
        &json!({
            "projectId": { "type": "fk", "model": "Project", "required": true },
            "description": "string",
        }),
    )?;

    // Simple query with a nested association
    let event = db.find("TimeEvent", 3).expect("seeded event").with("project")?;
    println!("event 3 with its project: {event}");

    // The same query through the type-level handle
    let events = db.model("TimeEvent");
    let event = events.find(3).expect("seeded event").with("project")?;
    println!("same, via the model handle: {event}");

    // A collection, narrowed in place
    let mut for_project = db
        .where_by("TimeEvent", "projectId", &json!(2), "=")?
        .expect("TimeEvent partition exists");
    for_project.where_by("id", &json!(4), ">=")?;
    println!("events for project 2 with id >= 4:");
    for event in &for_project {
        println!("  {event}");
    }

    // Non-mutating lookups on the collection
    if let Some(found) = for_project.find(5) {
        println!("collection find(5): {found}");
    }
    if let Some(first) = for_project.first() {
        println!("collection first(): {first}");
    }

    // Create, update, delete through the store
    let project = db.insert("Project", &json!({"title": "you wish", "other": "non-schema param"}))?;
    let event = db.insert("TimeEvent", &json!({"projectId": project.id()}))?;
    let event = db.update(
        "TimeEvent",
        event.id().expect("persisted"),
        &json!({"description": "Snail mate", "projectId": 2}),
    )?;
    println!("created and reworked: {event}");

    db.delete("TimeEvent", 2)?;
    assert!(db.find("TimeEvent", 2).is_none());
    log::info!("deleted TimeEvent/2");

    // Create through the handle, then mutate and put
    let projects = db.model("Project");
    let mut project = projects.create(&json!({"title": "Hallooo"}))?;
    project.set("title", json!("jajaj"))?;
    project.put()?;

    // Or start from an unpersisted instance
    let mut draft = projects.new_instance();
    draft.set("title", json!("Massov"))?;
    draft.put()?;
    println!(
        "projects now: {}",
        db.where_by("Project", "title", &json!(""), "!=")?
            .expect("Project partition exists")
            .len()
    );

    Ok(())
}
