//! In-memory collection
//!
//! A [`RequestHandler`] over a keyed set of text records, each owned by the
//! user that inserted it. Used by the `marina-server` binary.
//!
//! ## Commands
//! - `login` / `register` (before authentication)
//! - `help`, `info`, `show`
//! - `insert <key> <value>`, `update <key> <value>`, `remove_key <key>`
//! - `clear` (removes the caller's records only)
//! - `exit`, `server_exit`

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::network::RequestHandler;
use crate::protocol::{Request, Response, ResponseCode, User, EXIT_COMMAND};

/// Command that asks the server to shut down
pub const SERVER_EXIT_COMMAND: &str = "server_exit";

const HELP: &str = "\
help                      show this list
info                      collection summary
show                      list all records
insert <key> <value>      add a record
update <key> <value>      replace one of your records
remove_key <key>          delete one of your records
clear                     delete all of your records
exit                      end the session
server_exit               shut the server down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub value: String,
    pub owner: String,
}

/// Shared collection plus its user registry
pub struct Collection {
    records: RwLock<BTreeMap<String, Record>>,
    users: Mutex<HashMap<String, String>>,
    created: SystemTime,
}

impl Collection {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            users: Mutex::new(HashMap::new()),
            created: SystemTime::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Record> {
        self.records.read().get(key).cloned()
    }

    fn value_of(request: &Request) -> Option<String> {
        request
            .payload
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn insert(&self, request: &Request, user: &User) -> Response {
        let (key, Some(value)) = (&request.argument, Self::value_of(request)) else {
            return Response::error("Usage: insert <key> <value>");
        };
        if key.is_empty() {
            return Response::error("Usage: insert <key> <value>");
        }

        let mut records = self.records.write();
        if records.contains_key(key) {
            return Response::error(format!("Record '{}' already exists.", key));
        }
        records.insert(
            key.clone(),
            Record {
                value,
                owner: user.login.clone(),
            },
        );
        Response::ok(format!("Record '{}' added.", key))
    }

    fn update(&self, request: &Request, user: &User) -> Response {
        let Some(value) = Self::value_of(request) else {
            return Response::error("Usage: update <key> <value>");
        };

        let mut records = self.records.write();
        match records.get_mut(&request.argument) {
            None => Response::error(format!("No record '{}'.", request.argument)),
            Some(record) if record.owner != user.login => {
                Response::error(format!("Record '{}' belongs to another user.", request.argument))
            }
            Some(record) => {
                record.value = value;
                Response::ok(format!("Record '{}' updated.", request.argument))
            }
        }
    }

    fn remove(&self, request: &Request, user: &User) -> Response {
        let mut records = self.records.write();
        let owned = match records.get(&request.argument) {
            None => return Response::error(format!("No record '{}'.", request.argument)),
            Some(record) => record.owner == user.login,
        };
        if !owned {
            return Response::error(format!(
                "Record '{}' belongs to another user.",
                request.argument
            ));
        }
        records.remove(&request.argument);
        Response::ok(format!("Record '{}' removed.", request.argument))
    }

    fn clear(&self, user: &User) -> Response {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| record.owner != user.login);
        Response::ok(format!("{} record(s) removed.", before - records.len()))
    }

    fn show(&self) -> Response {
        let records = self.records.read();
        if records.is_empty() {
            return Response::ok("The collection is empty.");
        }
        let lines: Vec<String> = records
            .iter()
            .map(|(key, record)| format!("{} = {} ({})", key, record.value, record.owner))
            .collect();
        Response::ok(lines.join("\n"))
    }

    fn info(&self) -> Response {
        let age = self.created.elapsed().map(|d| d.as_secs()).unwrap_or(0);
        Response::ok(format!(
            "Records: {}, users: {}, up for {}s",
            self.len(),
            self.users.lock().len(),
            age
        ))
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandler for Collection {
    fn authenticate(&self, request: &Request) -> Response {
        if request.is_exit() {
            return Response::new(ResponseCode::ClientExit, "Goodbye.");
        }
        let Some(user) = &request.user else {
            return Response::error("Log in or register first.");
        };

        let mut users = self.users.lock();
        match request.command.as_str() {
            "register" => {
                if users.contains_key(&user.login) {
                    return Response::error(format!("User '{}' already exists.", user.login));
                }
                users.insert(user.login.clone(), user.password.clone());
                tracing::info!("Registered user '{}'", user.login);
                Response::ok(format!("User '{}' registered.", user.login))
            }
            "login" => match users.get(&user.login) {
                Some(password) if *password == user.password => {
                    Response::ok(format!("Welcome back, {}.", user.login))
                }
                _ => Response::error("Wrong login or password."),
            },
            other => Response::error(format!("'{}' is not allowed before logging in.", other)),
        }
    }

    fn execute(&self, request: &Request, user: &User) -> Response {
        match request.command.as_str() {
            "help" => Response::ok(HELP),
            "info" => self.info(),
            "show" => self.show(),
            "insert" => self.insert(request, user),
            "update" => self.update(request, user),
            "remove_key" => self.remove(request, user),
            "clear" => self.clear(user),
            EXIT_COMMAND => Response::new(ResponseCode::ClientExit, "Goodbye."),
            SERVER_EXIT_COMMAND => {
                tracing::info!("User '{}' requested server shutdown", user.login);
                Response::new(ResponseCode::ServerExit, "The server is shutting down.")
            }
            "login" | "register" => Response::error("Already logged in."),
            other => Response::error(format!(
                "Command '{}' not found. Type 'help' for help.",
                other
            )),
        }
    }
}
