//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions of every managed kind as YAML.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! cargo run --bin crdgen -- --kind storageaccount > config/crd/storageaccount.yaml
//! ```

use anyhow::Result;
use arm_resource_controller::crd::{ResourceGroup, StorageAccount};
use clap::{Parser, ValueEnum};
use kube::core::CustomResourceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    All,
    #[value(alias = "rg")]
    Resourcegroup,
    #[value(alias = "sa")]
    Storageaccount,
}

#[derive(Debug, Parser)]
#[command(name = "crdgen", about = "Generate CRD YAML for the ARM resource controller")]
struct Args {
    /// Which CRD to print
    #[arg(short, long, value_enum, default_value_t = Kind::All)]
    kind: Kind,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let crds = match args.kind {
        Kind::All => vec![ResourceGroup::crd(), StorageAccount::crd()],
        Kind::Resourcegroup => vec![ResourceGroup::crd()],
        Kind::Storageaccount => vec![StorageAccount::crd()],
    };

    let documents = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    print!("{}", documents.join("---\n"));
    Ok(())
}
