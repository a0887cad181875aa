use table::{IntoTable, Table};
mod table;

use crate::config::{read_config, Config};
use crate::registry::catalog::Catalog;
use crate::{die, ListArgs, ListObject, ListingFormat};

#[derive(serde::Serialize)]
struct Backend {
    key: String,
    model_id: String,
    revision: String,
    default: bool,
}

impl From<Vec<Backend>> for Table {
    fn from(value: Vec<Backend>) -> Self {
        let mut tab = Table::new();

        tab.set_header(vec!["KEY", "MODEL", "REVISION", "DEFAULT"]);

        for backend in value {
            tab.add_row(vec![
                backend.key,
                backend.model_id,
                backend.revision,
                if backend.default {
                    "yes".to_string()
                } else {
                    "no".to_string()
                },
            ]);
        }

        tab
    }
}

fn get_backends(catalog: &Catalog, default_key: &str) -> Vec<Backend> {
    catalog
        .iter()
        .map(|entry| Backend {
            key: entry.key.to_string(),
            model_id: entry.spec.model_id.clone(),
            revision: entry.spec.revision.clone(),
            default: entry.key.as_str() == default_key,
        })
        .collect()
}

fn format_output<O: IntoTable + serde::Serialize>(object: O, format: ListingFormat) -> String {
    match format {
        ListingFormat::Json => match serde_json::to_string_pretty(&object) {
            Ok(output) => format!("{}\n", output),
            Err(err) => die!("failed to serialize listing: {}", err),
        },
        ListingFormat::Table => object.into_table().to_string(),
        ListingFormat::HeaderlessTable => {
            let mut tab = object.into_table();

            tab.print_header(false);

            tab.to_string()
        }
    }
}

fn catalog_or_die(config: &Config) -> Catalog {
    match config.catalog() {
        Ok(catalog) => catalog,
        Err(err) => die!("invalid backend catalog: {}", err),
    }
}

pub(crate) fn list_cmd(args: &ListArgs, default_key: &str) {
    let config = read_config(args.config.clone());
    let catalog = catalog_or_die(&config);

    match &args.object {
        ListObject::Backends => {
            let backends = get_backends(&catalog, default_key);

            print!("{}", format_output(backends, args.format));
        }
    }
}
