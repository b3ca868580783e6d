//! Three instances sharing one group.

use anyhow::Result;
use propsync_core::{Config, InMemoryAuthority, SyncField, SynchronizationContext};
use propsync_types::InstanceIdentity;
use std::sync::Arc;

/// Group every instance in the walk-through joins.
const GROUP: &str = "G";

struct Person {
    label: &'static str,
    name: SyncField<String>,
    ctx: SynchronizationContext<InMemoryAuthority>,
}

impl Person {
    fn new(authority: &Arc<InMemoryAuthority>, label: &'static str) -> Result<Self> {
        let name = SyncField::new("name");
        let ctx = SynchronizationContext::builder(
            Arc::clone(authority),
            InstanceIdentity::new("Person", label)?,
        )
        .source_id(GROUP)
        .track(&name)
        .build()?;

        name.on_change(move |value: &String| {
            println!("  {} received name = {:?}", label, value);
        });

        Ok(Self { label, name, ctx })
    }

    fn set_name(&self, value: &str) -> Result<()> {
        println!("{} writes name = {:?}", self.label, value);
        self.ctx.write(&self.name, value.to_string())?;
        Ok(())
    }
}

/// Run the scenario command.
pub fn run(config: &Config) -> Result<()> {
    println!("=== propsync scenario ===");
    println!();

    let authority = Arc::new(InMemoryAuthority::with_config(&config.authority));
    let people = [
        Person::new(&authority, "x")?,
        Person::new(&authority, "y")?,
        Person::new(&authority, "z")?,
    ];
    let [x, y, z] = &people;

    for person in &people {
        println!("{} synchronizes with {}", person.label, GROUP);
        person.ctx.synchronize()?;
    }
    println!();

    x.set_name("Alice")?;
    println!();

    println!("y desynchronizes");
    y.ctx.desynchronize()?;
    x.set_name("Bob")?;
    println!();

    println!("Final values:");
    for person in &people {
        println!(
            "  {}: {:<6} ({:?})",
            person.label,
            person.name.get(),
            person.ctx.status()
        );
    }

    anyhow::ensure!(z.name.get() == "Bob", "z did not receive the second write");
    anyhow::ensure!(y.name.get() == "Alice", "y changed while desynchronized");

    let stats = authority.stats();
    println!();
    println!(
        "Authority: {} pushes, {} pulls, {} notifications",
        stats.pushes_total, stats.pulls_total, stats.notifications_delivered
    );

    Ok(())
}
