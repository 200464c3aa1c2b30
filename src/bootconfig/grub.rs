//! GRUB legacy `menu.lst` for a single flavour.
use super::ConfigParams;

/// Render `menu.lst` booting `params.flavour`.
///
/// The file is rewritten on every install; only the most recent flavour gets
/// an entry.
#[must_use]
pub fn menu_lst(params: &ConfigParams) -> String {
    let flavour = params.flavour.as_str();
    let kernel = std::iter::once(format!(
        "kernel /boot/release/{flavour}/linux26 apm=power-off lang=us vga=791 quiet boot=live nomce module={flavour}"
    ))
    .chain(params.boot_options.split_whitespace().map(String::from))
    .collect::<Vec<_>>()
    .join(" ");
    format!(
        "# misc options:\n\
         timeout 30\n\
         # color red/blue green/black\n\
         splashimage=/boot/grub/splash.xpm.gz\n\
         foreground  = 000000\n\
         background  = FFCC33\n\
         \n\
         # define entries:\n\
         title {flavour}  - Default boot (using 1024x768 framebuffer)\n\
         {kernel}\n\
         initrd /boot/release/{flavour}/initrd.gz\n"
    )
}
