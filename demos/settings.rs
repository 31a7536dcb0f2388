use sovran_typedmap::{
    DelegatingSupplier, ImmutableTypedMap, MapError, SuppliedTypedMap, TypeDescriptor, TypedKey,
    TypedMap,
};
use std::collections::BTreeMap;

/// Demonstrates layering user settings over frozen defaults
fn main() -> Result<(), MapError> {
    let keys = SettingKeys::new();

    // Defaults never change once built
    let defaults = ImmutableTypedMap::builder()
        .put(&keys.theme, "light".to_string())
        .put(&keys.font_size, 12)
        .put(&keys.recent_files, Vec::new())
        .put_raw("build", "2024.1".to_string())
        .put_supplier(
            "editor",
            DelegatingSupplier::new(TypeDescriptor::of::<String>(), || {
                std::env::var("EDITOR").ok().or_else(|| Some("vi".to_string()))
            })?,
        )
        .build()?;

    println!("DEFAULTS:");
    print_settings(&defaults);

    // User settings start from the defaults and accept edits
    let mut settings = SuppliedTypedMap::new();
    settings.put_all(&defaults)?;

    settings.put(&keys.theme, "dark".to_string())?;
    if let Some(size) = settings.get_mut(&keys.font_size)? {
        *size += 2;
    }
    if let Some(files) = settings.get_mut(&keys.recent_files)? {
        files.push("notes.md".to_string());
        files.push("todo.txt".to_string());
    }

    // Declare a setting before anyone has chosen a value
    settings.set_type(&keys.shortcuts)?;

    println!("\nUSER SETTINGS:");
    print_settings(&settings);

    // Typed reads catch the wrong type for an existing setting
    match settings.get(&TypedKey::<String, &str>::new("font_size")) {
        Ok(value) => println!("\nFont size: {:?}", value),
        Err(e) => println!("\nRejected read: {}", e),
    }

    // Settings that were never declared are reported as missing
    match settings.get(&TypedKey::<bool, &str>::new("telemetry")) {
        Ok(value) => println!("Telemetry: {:?}", value),
        Err(e) => println!("Rejected read: {}", e),
    }

    // Resetting clears values but keeps every declared type
    settings.remove(&keys.theme)?;
    println!("\nAfter resetting the theme:");
    print_settings(&settings);

    println!(
        "\nSettings match defaults: {}",
        settings == defaults
    );

    Ok(())
}

struct SettingKeys {
    theme: TypedKey<String, &'static str>,
    font_size: TypedKey<u32, &'static str>,
    recent_files: TypedKey<Vec<String>, &'static str>,
    shortcuts: TypedKey<BTreeMap<String, String>, &'static str>,
}

impl SettingKeys {
    fn new() -> Self {
        Self {
            theme: TypedKey::new("theme"),
            font_size: TypedKey::new("font_size"),
            recent_files: TypedKey::new("recent_files"),
            shortcuts: TypedKey::with_type(
                TypeDescriptor::of::<BTreeMap<String, String>>(),
                "shortcuts",
            ),
        }
    }
}

fn print_settings<M: TypedMap<&'static str>>(settings: &M) {
    for entry in settings.entries() {
        println!("  {}", entry);
    }
}
