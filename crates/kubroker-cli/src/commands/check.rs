use anyhow::{Context, Result};
use kubroker_core::{Catalog, ServiceOffering};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::CheckArgs;
use crate::output::{print_success, print_warning};

pub fn run(args: &CheckArgs) -> Result<()> {
    let catalog = Catalog::load_dir(&args.dir)
        .with_context(|| format!("Failed to load catalog from {}", args.dir.display()))?;

    if catalog.is_empty() {
        print_warning(&format!("No services in {}", args.dir.display()));
        return Ok(());
    }

    println!("{}", services_table(&catalog));
    if args.plans {
        println!("{}", plans_table(catalog.services()));
    }
    print_success(&format!(
        "Catalog {} is valid ({} services)",
        args.dir.display(),
        catalog.services().len()
    ));
    Ok(())
}

fn services_table(catalog: &Catalog) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Service", "ID", "Plans", "Bindable", "Template"]);
    for service in catalog.services() {
        let template = if catalog.template(&service.name).is_ok() {
            "yes"
        } else {
            "missing"
        };
        builder.push_record([
            service.name.clone(),
            service.id.clone(),
            service.plans.len().to_string(),
            service.bindable.to_string(),
            template.to_string(),
        ]);
    }
    builder.build().with(Style::rounded()).to_string()
}

fn plans_table(services: &[ServiceOffering]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Service", "Plan", "ID", "Quota"]);
    for service in services {
        for plan in &service.plans {
            let quota = plan
                .quota()
                .map(|q| q.to_string())
                .unwrap_or_else(|_| "-".to_string());
            builder.push_record([
                service.name.clone(),
                plan.name.clone(),
                plan.id.clone(),
                quota,
            ]);
        }
    }
    builder.build().with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubroker_core::{OfferingConfig, generate_offering};

    fn catalog() -> Catalog {
        let config = OfferingConfig {
            name: "zookeeper".into(),
            cpu_quota: vec!["1".into()],
            memory_quota: vec!["1Gi".into(), "4Gi".into()],
            disk_quota: vec!["10Gi".into()],
            ..Default::default()
        };
        Catalog::builder()
            .offering(generate_offering(&config).unwrap())
            .template("zookeeper", "kind: Service\n")
            .build()
            .unwrap()
    }

    #[test]
    fn services_table_lists_each_service() {
        let table = services_table(&catalog());
        assert!(table.contains("zookeeper"));
        assert!(table.contains("yes"));
    }

    #[test]
    fn plans_table_lists_each_plan() {
        let catalog = catalog();
        let table = plans_table(catalog.services());
        assert!(table.contains("p-1-1Gi-10Gi"));
        assert!(table.contains("p-1-4Gi-10Gi"));
    }
}
