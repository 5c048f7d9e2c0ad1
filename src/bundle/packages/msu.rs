// src/bundle/packages/msu.rs

//! MSU package processing

use super::{PackageContext, publish_package_variables};
use crate::bundle::facade::PackageFacade;
use crate::data::symbols::*;
use crate::error::Result;
use tracing::warn;

pub(super) fn process(facade: &PackageFacade, ctx: &mut PackageContext<'_>) -> Result<()> {
    let payload = ctx.package_payload(facade)?.map(|(_, p)| p);

    let msu = facade.specific::<MsuPackageSymbol>(ctx.section)?;
    if msu.detect_condition.is_none() {
        warn!("MsuPackage {} has no detect condition", facade.id);
    }

    let package = facade.package_mut(ctx.section)?;
    // Windows updates always install for the machine
    package.per_machine = YesNoDefault::Yes;
    if let Some(payload) = &payload
        && package.cache_id.is_none()
    {
        package.cache_id = payload.hash.clone();
    }

    publish_package_variables(facade, ctx)
}
