use sb_core::{Command, ScriptUnit, StepBlocksError};

use crate::xml::{parse_xml_document, XmlElementNode};

/// Parses either a `<unit>` document or a Selenese HTML table into a unit.
pub fn parse_unit_source(path: &str, source: &str) -> Result<ScriptUnit, StepBlocksError> {
    let document = parse_xml_document(source)?;
    let root = &document.root;

    let (name, commands) = match root.name.as_str() {
        "unit" => (
            root.attribute("name")
                .map(str::to_string)
                .unwrap_or_else(|| unit_name_from_path(path)),
            parse_command_elements(path, root)?,
        ),
        "html" => (
            selenese_title(root).unwrap_or_else(|| unit_name_from_path(path)),
            parse_selenese_rows(root),
        ),
        other => {
            return Err(StepBlocksError::syntax(
                "XML_ROOT_INVALID",
                format!(
                    "Expected <unit> or <html> root in file \"{}\", got <{}>.",
                    path, other
                ),
            ))
        }
    };

    Ok(ScriptUnit {
        name,
        path: path.to_string(),
        commands,
    })
}

pub fn unit_name_from_path(path: &str) -> String {
    let file_name = path.rsplit(&['/', '\\'][..]).next().unwrap_or(path);
    for suffix in [".unit.xml", ".html", ".xml"] {
        if let Some(stem) = file_name.strip_suffix(suffix) {
            return stem.to_string();
        }
    }
    file_name.to_string()
}

fn parse_command_elements(
    path: &str,
    root: &XmlElementNode,
) -> Result<Vec<Command>, StepBlocksError> {
    let mut commands = Vec::new();
    for element in root.child_elements() {
        if element.name != "command" {
            return Err(StepBlocksError::syntax(
                "XML_ELEMENT_UNSUPPORTED",
                format!(
                    "Unsupported element <{}> in unit \"{}\" at line {}.",
                    element.name, path, element.location.start.line
                ),
            ));
        }
        let Some(name) = element.attribute("name").filter(|name| !name.trim().is_empty()) else {
            return Err(StepBlocksError::syntax(
                "XML_COMMAND_NAME_MISSING",
                format!(
                    "<command> without a name in unit \"{}\" at line {}.",
                    path, element.location.start.line
                ),
            ));
        };
        commands.push(Command {
            name: name.trim().to_string(),
            target: element.attribute("target").unwrap_or_default().to_string(),
            value: element.attribute("value").unwrap_or_default().to_string(),
            location: Some(element.location.clone()),
        });
    }
    Ok(commands)
}

fn selenese_title(root: &XmlElementNode) -> Option<String> {
    let mut titles = Vec::new();
    root.descendants_named("title", &mut titles);
    titles
        .first()
        .map(|title| title.text_content().trim().to_string())
        .filter(|title| !title.is_empty())
}

fn parse_selenese_rows(root: &XmlElementNode) -> Vec<Command> {
    let mut rows = Vec::new();
    root.descendants_named("tr", &mut rows);

    rows.into_iter()
        .filter_map(|row| {
            let cells = row
                .child_elements()
                .filter(|cell| cell.name.eq_ignore_ascii_case("td"))
                .collect::<Vec<_>>();
            if cells.len() != 3 {
                return None;
            }
            let name = cells[0].text_content().trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(Command {
                name,
                target: cells[1].text_content(),
                value: cells[2].text_content(),
                location: Some(row.location.clone()),
            })
        })
        .collect()
}
