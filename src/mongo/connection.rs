use std::collections::BTreeMap;
use std::sync::Arc;

use mongodb::sync::Client;

const SYSTEM_DATABASES: &[&str] = &["admin", "config", "local"];

/// Host and port as typed into the connection bar. The port stays raw text:
/// a value that does not parse still produces a connect attempt, which the
/// driver rejects, which runs the ordinary failure path.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: String,
}

impl ConnectTarget {
    pub fn uri(&self) -> String {
        format!("mongodb://{}:{}", self.host.trim(), self.port.trim())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseSpec {
    pub collections: Vec<String>,
}

/// Database name to its specification, as reported by one successful
/// connect. Replaced wholesale per connect, never patched.
pub type Catalog = BTreeMap<String, DatabaseSpec>;

#[derive(Debug, Clone)]
pub struct ConnectionBootstrap {
    pub handle: Arc<Client>,
    pub catalog: Catalog,
}

pub fn connect_and_discover(
    target: ConnectTarget,
    hide_system_databases: bool,
) -> Result<ConnectionBootstrap, String> {
    let client = Client::with_uri_str(target.uri()).map_err(|err| err.to_string())?;

    let mut databases = client.list_database_names().run().map_err(|err| err.to_string())?;
    if hide_system_databases {
        databases = filter_system_databases(databases);
    }
    databases.sort_unstable();

    let mut catalog = Catalog::new();
    for db_name in databases {
        let mut collections = client
            .database(&db_name)
            .list_collection_names()
            .run()
            .map_err(|err| err.to_string())?;
        collections.sort_unstable();
        catalog.insert(db_name, DatabaseSpec { collections });
    }

    Ok(ConnectionBootstrap { handle: Arc::new(client), catalog })
}

fn filter_system_databases(mut databases: Vec<String>) -> Vec<String> {
    databases.retain(|db| !SYSTEM_DATABASES.contains(&db.as_str()));
    databases
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_vec(items: &[&str]) -> Vec<String> {
        items.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn system_databases_are_filtered() {
        let databases = to_vec(&["admin", "app", "config", "local", "reports"]);
        let filtered = filter_system_databases(databases);
        assert_eq!(filtered, to_vec(&["app", "reports"]));
    }

    #[test]
    fn filter_keeps_everything_when_nothing_matches() {
        let databases = to_vec(&["app", "reports"]);
        let filtered = filter_system_databases(databases.clone());
        assert_eq!(filtered, databases);
    }

    #[test]
    fn uri_is_built_from_trimmed_inputs() {
        let target =
            ConnectTarget { host: String::from(" localhost "), port: String::from("27017 ") };
        assert_eq!(target.uri(), "mongodb://localhost:27017");
    }

    #[test]
    fn uri_carries_unparseable_port_text_through() {
        let target = ConnectTarget { host: String::from("localhost"), port: String::from("27x") };
        assert_eq!(target.uri(), "mongodb://localhost:27x");
    }
}
