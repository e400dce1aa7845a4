pub(crate) mod cache;
pub(crate) mod ssm;
pub(crate) use cache::CachedLookupStore;
pub(crate) use ssm::SsmLookupStore;
