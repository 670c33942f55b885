use crate::traits::HalError;
use hspi_core::frame::{TAG_MASK, USER_ID_MASK};
use serde::Deserialize;

/// Header identity an agent stamps on the frames it sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_user_id0")]
    pub user_id0: u32,
    #[serde(default = "default_user_id1")]
    pub user_id1: u32,
    #[serde(default = "default_tag")]
    pub tag: u8,
}

fn default_user_id0() -> u32 {
    0x3AB_CDEF
}

fn default_user_id1() -> u32 {
    0x345_6789
}

fn default_tag() -> u8 {
    0b11
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            user_id0: default_user_id0(),
            user_id1: default_user_id1(),
            tag: default_tag(),
        }
    }
}

impl LinkConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn user_ids(&self) -> [u32; 2] {
        [self.user_id0, self.user_id1]
    }

    pub fn validate(&self) -> Result<(), HalError> {
        for (name, id) in [("user_id0", self.user_id0), ("user_id1", self.user_id1)] {
            if id & !USER_ID_MASK != 0 {
                return Err(HalError::InvalidConfig(format!(
                    "{name} {id:#x} does not fit in 26 bits"
                )));
            }
        }
        if u32::from(self.tag) & !TAG_MASK != 0 {
            return Err(HalError::InvalidConfig(format!(
                "tag {} does not fit in 2 bits",
                self.tag
            )));
        }
        Ok(())
    }
}
