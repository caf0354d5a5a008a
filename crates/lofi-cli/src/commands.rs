//! Command parsing and execution against a workspace

use anyhow::{anyhow, bail, Context, Result};
use colored::*;
use lofi_core::{Actor, Causal, Cursor, DocId, PeerId, Permission, Primitive, Schema, Segment};
use lofi_sdk::{Doc, Sdk};

/// Result of a command, rendered for the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Nil,
    Int(i64),
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl Reply {
    pub fn render(&self) -> String {
        match self {
            Reply::Ok => "OK".green().to_string(),
            Reply::Nil => "(nil)".dimmed().to_string(),
            Reply::Int(n) => n.to_string().yellow().to_string(),
            Reply::Bool(b) => b.to_string().yellow().to_string(),
            Reply::Text(s) => s.clone(),
            Reply::List(items) if items.is_empty() => "(empty)".dimmed().to_string(),
            Reply::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}) {}", i + 1, item))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Split a command line into words; double quotes group words
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => current.extend(chars.next()),
                        Some(c) => current.push(c),
                        None => bail!("unterminated quote"),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn arg<'a>(args: &'a [String], i: usize, name: &str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument <{}>", name))
}

fn doc(sdk: &Sdk, id: &str) -> Result<Doc> {
    let id: DocId = id.parse()?;
    Ok(sdk.open_document(&id)?)
}

/// Cursor at `selector`; `$` or `.` is the document root
fn cursor_at(doc: &Doc, selector: &str) -> Result<Cursor> {
    let selector = selector.strip_prefix('$').unwrap_or(selector);
    Ok(doc.cursor().walk(selector)?)
}

fn index(s: &str) -> Result<usize> {
    s.parse().with_context(|| format!("{:?} is not an index", s))
}

/// Write `value` at a register or flag
fn assign(cursor: &Cursor, value: &str) -> Result<Causal> {
    match cursor.schema() {
        Schema::Reg(kind) => Ok(cursor.register_assign(Primitive::parse(*kind, value)?)?),
        Schema::Flag => match value.parse::<bool>() {
            Ok(true) => Ok(cursor.flag_enable()?),
            Ok(false) => Ok(cursor.flag_disable()?),
            Err(_) => bail!("flags take true or false, not {:?}", value),
        },
        other => bail!("cannot assign to a {} at {}", other.kind_name(), cursor.path()),
    }
}

fn read(cursor: &Cursor) -> Result<Reply> {
    Ok(match cursor.schema() {
        Schema::Null => Reply::Nil,
        Schema::Flag => Reply::Bool(cursor.flag_enabled()?),
        Schema::Reg(_) => {
            let mut values: Vec<String> = cursor
                .register_primitives()?
                .iter()
                .map(Primitive::to_string)
                .collect();
            match values.len() {
                0 => Reply::Nil,
                1 => Reply::Text(values.remove(0)),
                _ => Reply::List(values),
            }
        }
        Schema::Map { .. } => Reply::List(
            cursor
                .map_keys()?
                .iter()
                .map(Primitive::to_string)
                .collect(),
        ),
        Schema::Array(_) => Reply::Int(cursor.array_length()? as i64),
        Schema::Struct(fields) => Reply::List(fields.keys().cloned().collect()),
    })
}

pub fn execute(sdk: &Sdk, line: &str) -> Result<Reply> {
    let words = tokenize(line)?;
    let Some((command, args)) = words.split_first() else {
        return Ok(Reply::Nil);
    };

    match command.to_uppercase().as_str() {
        "PEER" => Ok(Reply::Text(sdk.peer_id().to_string())),

        "SCHEMAS" => Ok(Reply::List(
            sdk.package()
                .iter()
                .map(|s| format!("{} v{}", s.name, s.version))
                .collect(),
        )),

        "DOCS" => {
            let schema = args.first().map(String::as_str);
            Ok(Reply::List(
                sdk.list_documents(schema)?.map(|id| id.to_string()).collect(),
            ))
        }

        "CREATE" => {
            let doc = sdk.create_document(arg(args, 0, "schema")?)?;
            Ok(Reply::Text(doc.id().to_string()))
        }

        "ADD" => {
            let id: DocId = arg(args, 0, "id")?.parse()?;
            sdk.add_document(id, arg(args, 1, "schema")?)?;
            Ok(Reply::Ok)
        }

        "RM" => {
            let id: DocId = arg(args, 0, "id")?.parse()?;
            sdk.remove_document(&id)?;
            Ok(Reply::Ok)
        }

        "GET" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let selector = args.get(1).map(String::as_str).unwrap_or("$");
            read(&cursor_at(&doc, selector)?)
        }

        "SET" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let cursor = cursor_at(&doc, arg(args, 1, "selector")?)?;
            doc.apply(assign(&cursor, arg(args, 2, "value")?)?)?;
            Ok(Reply::Ok)
        }

        "ENABLE" | "DISABLE" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let cursor = cursor_at(&doc, arg(args, 1, "selector")?)?;
            let delta = if command.eq_ignore_ascii_case("ENABLE") {
                cursor.flag_enable()?
            } else {
                cursor.flag_disable()?
            };
            doc.apply(delta)?;
            Ok(Reply::Ok)
        }

        // INSERT <id> <array> <index> [<selector in element>] <value>
        "INSERT" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let array = cursor_at(&doc, arg(args, 1, "selector")?)?;
            let element = array.array_insert(index(arg(args, 2, "index")?)?)?;
            let (target, value) = match args.len() {
                4 => (element, &args[3]),
                5 => (element.walk(&args[3])?, &args[4]),
                _ => bail!("usage: INSERT <id> <array> <index> [<selector>] <value>"),
            };
            doc.apply(assign(&target, value)?)?;
            Ok(Reply::Ok)
        }

        "MOVE" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let cursor = cursor_at(&doc, arg(args, 1, "selector")?)?;
            doc.apply(cursor.array_move(index(arg(args, 2, "to")?)?)?)?;
            Ok(Reply::Ok)
        }

        "DEL" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let cursor = cursor_at(&doc, arg(args, 1, "selector")?)?;
            let delta = match cursor.path().last() {
                Some(Segment::Elem(_)) => cursor.array_delete()?,
                Some(Segment::Key(_)) => cursor.map_remove()?,
                _ => bail!("{} is neither an array element nor a map entry", cursor.path()),
            };
            doc.apply(delta)?;
            Ok(Reply::Ok)
        }

        "KEYS" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let cursor = cursor_at(&doc, args.get(1).map(String::as_str).unwrap_or("$"))?;
            Ok(Reply::List(
                cursor.map_keys()?.iter().map(Primitive::to_string).collect(),
            ))
        }

        "LEN" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let cursor = cursor_at(&doc, args.get(1).map(String::as_str).unwrap_or("$"))?;
            Ok(Reply::Int(cursor.array_length()? as i64))
        }

        "GRANT" | "REVOKE" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let cursor = cursor_at(&doc, arg(args, 1, "selector")?)?;
            let actor: Actor = arg(args, 2, "peer|*")?.parse()?;
            let permission: Permission = arg(args, 3, "permission")?.parse()?;
            let delta = if command.eq_ignore_ascii_case("GRANT") {
                cursor.acl_grant(actor, permission)?
            } else {
                cursor.acl_revoke(actor, permission)?
            };
            if delta.is_empty() {
                return Ok(Reply::Nil);
            }
            doc.apply(delta)?;
            Ok(Reply::Ok)
        }

        "CAN" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let cursor = cursor_at(&doc, arg(args, 1, "selector")?)?;
            let peer: PeerId = arg(args, 2, "peer")?.parse()?;
            let permission: Permission = arg(args, 3, "permission")?.parse()?;
            Ok(Reply::Bool(cursor.acl_can(&peer, permission)))
        }

        "ACL" => {
            let doc = doc(sdk, arg(args, 0, "id")?)?;
            let acl = doc.cursor().acl();
            let mut lines: Vec<String> = acl
                .grants()
                .iter()
                .map(|g| format!("{} {} at {}", g.actor, g.permission, g.path))
                .collect();
            if let Some(root) = acl.root() {
                lines.insert(0, format!("{} root", root));
            }
            Ok(Reply::List(lines))
        }

        "ADDR" => {
            let sub = arg(args, 0, "ADD|RM|LIST")?.to_uppercase();
            let peer: PeerId = arg(args, 1, "peer")?.parse()?;
            match sub.as_str() {
                "ADD" => {
                    sdk.add_address(&peer, arg(args, 2, "address")?)?;
                    Ok(Reply::Ok)
                }
                "RM" => {
                    sdk.remove_address(&peer, arg(args, 2, "address")?)?;
                    Ok(Reply::Ok)
                }
                "LIST" => Ok(Reply::List(sdk.addresses(&peer))),
                other => bail!("unknown ADDR subcommand {:?}", other),
            }
        }

        "STATS" => {
            let stats = sdk.stats()?;
            Ok(Reply::List(vec![
                format!("documents: {}", stats.document_count),
                format!("bytes: {}", stats.total_size_bytes),
                format!("addresses: {}", stats.address_count),
            ]))
        }

        other => bail!("unknown command {:?}, try 'help'", other),
    }
}

pub fn print_help() {
    println!(
        r#"
{}

{}
  PEER                                        Show this replica's peer id
  SCHEMAS                                     List schemas in the package
  STATS                                       Storage statistics

{}
  DOCS [schema]                               List document ids
  CREATE <schema>                             Create a document
  ADD <id> <schema>                           Register a document created elsewhere
  RM <id>                                     Remove the local copy of a document

{}
  GET <id> [selector]                         Read the value at a selector
  SET <id> <selector> <value>                 Assign a register or flag
  ENABLE <id> <selector>                      Enable a flag
  DISABLE <id> <selector>                     Disable a flag
  INSERT <id> <array> <index> [sel] <value>   Insert an array element
  MOVE <id> <element> <index>                 Move an array element
  DEL <id> <selector>                         Delete an array element or map entry
  KEYS <id> [selector]                        List map keys
  LEN <id> [selector]                         Array length

{}
  GRANT <id> <selector> <peer|*> <perm>       Grant read, write, control or own
  REVOKE <id> <selector> <peer|*> <perm>      Revoke matching grants
  CAN <id> <selector> <peer> <perm>           Check a permission
  ACL <id>                                    List effective grants

{}
  ADDR ADD <peer> <address>                   Remember an address
  ADDR RM <peer> <address>                    Forget an address
  ADDR LIST <peer>                            Known addresses of a peer

{}
  help                                        Show this help
  clear                                       Clear screen
  quit/exit                                   Exit

Selectors look like {} or {}; {} is the document root.
"#,
        "lofi Commands".cyan().bold(),
        "Workspace".yellow().bold(),
        "Documents".yellow().bold(),
        "Values".yellow().bold(),
        "Access control".yellow().bold(),
        "Address book".yellow().bold(),
        "Local".yellow().bold(),
        "todos[0].title".cyan(),
        "tags.work".cyan(),
        "$".cyan(),
    );
}
