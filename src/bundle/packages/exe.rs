// src/bundle/packages/exe.rs

//! EXE package processing

use super::{PackageContext, publish_package_variables};
use crate::bundle::facade::PackageFacade;
use crate::data::symbols::*;
use crate::error::Result;
use crate::messaging::MessageId;

pub(super) fn process(facade: &PackageFacade, ctx: &mut PackageContext<'_>) -> Result<()> {
    let payload = ctx.package_payload(facade)?.map(|(_, p)| p);
    let source_line = ctx.source_line(facade);

    let exe = facade.specific_mut::<ExePackageSymbol>(ctx.section)?;
    if exe.detection_type == ExeDetectionType::None && exe.detect_condition.is_some() {
        exe.detection_type = ExeDetectionType::Condition;
    }
    if exe.install_command.is_none() {
        exe.install_command = Some(String::new());
    }
    exe.repairable = exe.repair_command.is_some();
    let arp_without_id = exe.detection_type == ExeDetectionType::Arp && exe.arp_id.is_none();
    let uninstallable = exe.uninstall_command.is_some() || exe.detection_type == ExeDetectionType::Arp;

    if arp_without_id {
        ctx.messaging.error(
            MessageId::InvalidExePackage,
            source_line.as_ref(),
            format!("ExePackage {} uses ARP detection without an ARP id", facade.id),
        );
    }

    let package = facade.package_mut(ctx.section)?;
    if !uninstallable {
        // No way to uninstall
        package.permanent = true;
    }
    if let Some(payload) = &payload {
        if package.version.is_none() {
            package.version = payload.version.clone();
        }
        if package.cache_id.is_none() {
            package.cache_id = payload.hash.clone();
        }
    }

    publish_package_variables(facade, ctx)
}
