//! Resource type definitions

use cirrus_core::provider::ResourceType;
use cirrus_core::schema::ResourceSchema;

use crate::cloudtrail::event_data_store;
use crate::emr::cluster;
use crate::ssm::maintenance_window;

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:path) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
        }
    };
}

define_resource_type!(EmrClusterType, cluster::RESOURCE_TYPE, cluster::schema);
define_resource_type!(
    EventDataStoreType,
    event_data_store::RESOURCE_TYPE,
    event_data_store::schema
);
define_resource_type!(
    MaintenanceWindowType,
    maintenance_window::RESOURCE_TYPE,
    maintenance_window::schema
);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(EmrClusterType),
        Box::new(EventDataStoreType),
        Box::new(MaintenanceWindowType),
    ]
}
