//! Task listing for `--list` and `--list-all`

use crate::config::types::Task;
use colored::Colorize;

/// Output format for task listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    Table,
    Markdown,
}

impl ListFormat {
    /// Map the `--list=<format>` value; anything but `md` is a table
    pub fn from_arg(value: &str) -> Self {
        match value {
            "md" => ListFormat::Markdown,
            _ => ListFormat::Table,
        }
    }
}

/// Print tasks to stdout
pub fn print_tasks(tasks: &[Task], format: ListFormat) {
    match format {
        ListFormat::Table => print!("{}", render_table(tasks)),
        ListFormat::Markdown => print!("{}", render_markdown(tasks)),
    }
}

fn description(task: &Task) -> &str {
    task.description.as_deref().unwrap_or("")
}

/// Aligned name/description columns with a colored header
pub fn render_table(tasks: &[Task]) -> String {
    let width = tasks
        .iter()
        .map(|task| task.name.len())
        .chain(std::iter::once("Name".len()))
        .max()
        .unwrap_or(0);

    let mut out = format!(
        "{}  {}\n",
        format!("{:<width$}", "Name", width = width).bold(),
        "Description".bold()
    );
    for task in tasks {
        out.push_str(&format!(
            "{}  {}\n",
            format!("{:<width$}", task.name, width = width).cyan(),
            description(task)
        ));
    }
    out
}

/// Markdown table, with `|` escaped in descriptions
pub fn render_markdown(tasks: &[Task]) -> String {
    let mut out = String::from("| Name | Description |\n|------|-------------|\n");
    for task in tasks {
        out.push_str(&format!(
            "| **{}** | {} |\n",
            task.name,
            description(task).replace('|', "\\|").replace('\n', " ")
        ));
    }
    out
}
