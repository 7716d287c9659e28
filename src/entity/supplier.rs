use serde::{Deserialize, Serialize};

use super::RecordBase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    #[serde(flatten)]
    pub base: RecordBase,
    pub name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub goods_supplied: Option<String>,
}

impl Supplier {
    pub fn new(name: String, contact_name: String, phone: String) -> Self {
        Self {
            base: RecordBase::new(),
            name,
            contact_name,
            phone,
            email: None,
            goods_supplied: None,
        }
    }
}
