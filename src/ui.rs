use colored::Colorize;
use provider::{Action, Change, InstanceMeta, Plan};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

// ============================================================================
// Plans and instances
// ============================================================================

fn action_label(action: Action) -> String {
    let label = action.to_string();
    match action {
        Action::Create => label.green().to_string(),
        Action::Update => label.yellow().to_string(),
        Action::Destroy => label.red().to_string(),
        Action::Noop => label.dimmed().to_string(),
    }
}

/// One line per change, `+` added, `-` removed, `~` modified
pub fn change_line(change: &Change) -> String {
    match (&change.old, &change.new) {
        (None, Some(new)) => format!("{} {} = {new}", "+".green(), change.field),
        (Some(old), None) => format!("{} {} = {old}", "-".red(), change.field),
        (Some(old), Some(new)) => {
            format!("{} {}: {old} -> {new}", "~".yellow(), change.field)
        }
        (None, None) => format!("  {}", change.field),
    }
}

/// Print a plan under the instance it belongs to
pub fn plan(name: &str, plan: &Plan) {
    println!("  {} {}", name.bold(), action_label(plan.action));
    for change in &plan.changes {
        println!("      {}", change_line(change));
    }
}

/// Print an instance snapshot
pub fn instance(meta: &InstanceMeta) {
    let mut title = format!("{} ({})", meta.name.bold(), meta.resource);
    if meta.read_only {
        title.push_str(&format!(" {}", "read-only".magenta()));
    }
    println!("  {title}");
    if !meta.references.is_empty() {
        kv("references", &meta.references.join(", "));
    }
    if let Some(state) = &meta.state {
        for (field, value) in state {
            kv(field, &value.to_string());
        }
    }
}
