//! Basic lofi Example
//!
//! Two in-memory workspaces edit the same document concurrently and converge
//! by exchanging deltas.
//!
//! Run with: cargo run -p lofi-sdk --example basic

use lofi_sdk::{Actor, Permission, Sdk};

const PACKAGE: &str = r#"{"schemas":[{"name":"todos","version":1,"schema":{"struct":{
    "title":{"reg":"str"},
    "todos":{"array":{"struct":{"title":{"reg":"str"},"done":"flag"}}}
}}}]}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("lofi Basic Example\n");

    let alice = Sdk::create_memory(PACKAGE.as_bytes())?;
    let bob = Sdk::create_memory(PACKAGE.as_bytes())?;

    // Alice creates the document and lets Bob write to it
    let a = alice.create_document("todos")?;
    a.apply(a.cursor().field("title")?.reg_assign_str("shopping")?)?;
    a.apply(a.cursor().acl_grant(Actor::Peer(bob.peer_id()), Permission::Write)?)?;

    // Bob learns about it and catches up
    let b = bob.add_document(a.id(), "todos")?;
    b.apply(a.unjoin(&b.ctx()))?;

    // Concurrent edits
    a.apply(a.cursor().field("title")?.reg_assign_str("groceries")?)?;
    b.apply(b.cursor().field("title")?.reg_assign_str("market")?)?;
    let todo = b.cursor().field("todos")?.array_insert(0)?;
    b.apply(todo.field("title")?.reg_assign_str("milk")?)?;

    // Exchange deltas both ways
    let to_bob = a.unjoin(&b.ctx());
    let to_alice = b.unjoin(&a.ctx());
    b.apply(to_bob)?;
    a.apply(to_alice)?;

    for (name, doc) in [("alice", &a), ("bob", &b)] {
        let titles: Vec<String> = doc.cursor().field("title")?.reg_strs()?.collect();
        let todos = doc.cursor().field("todos")?;
        println!("{}: title {:?}, {} todo(s)", name, titles, todos.array_length()?);
    }

    // Resolve the conflict with a write that has seen both values
    a.apply(a.cursor().field("title")?.reg_assign_str("groceries")?)?;
    b.apply(a.unjoin(&b.ctx()))?;
    let titles: Vec<String> = b.cursor().field("title")?.reg_strs()?.collect();
    println!("resolved: {:?}", titles);

    Ok(())
}
