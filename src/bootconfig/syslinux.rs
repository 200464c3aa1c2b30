//! Typed syslinux configuration: stanza records rendered at the boundary.
use std::fmt;

use super::ConfigParams;

/// Prefix of the first line of a generated `syslinux.cfg`.
pub const MAIN_MARKER: &str = "## main syslinux configuration - generated by grml2usb";

/// Comment prefix preceding every flavour stanza.
pub const FLAVOUR_MARKER: &str = "# flavour specific configuration for";

/// Help screens bound to `F2`..`F10`.
pub const HELP_SCREENS: [&str; 9] = ["f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10"];

const BASE_APPEND: &[&str] = &["apm=power-off", "boot=live", "nomce", "quiet"];

/// One `LABEL` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    /// Comment written above the label, without the leading `# `.
    pub comment: Option<String>,
    /// Boot label typed at the prompt.
    pub label: String,
    /// Optional menu title.
    pub menu_label: Option<String>,
    /// Kernel path.
    pub kernel: String,
    /// Kernel command line, one option per element.
    pub append: Vec<String>,
}

impl fmt::Display for Stanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(comment) = &self.comment {
            writeln!(f, "# {comment}")?;
        }
        // Entries with a menu title use the single-space LABEL form.
        match &self.menu_label {
            Some(menu) => {
                writeln!(f, "LABEL {}", self.label)?;
                writeln!(f, "MENU LABEL {menu}")?;
            }
            None => writeln!(f, "LABEL  {}", self.label)?,
        }
        writeln!(f, "KERNEL {}", self.kernel)?;
        writeln!(f, "APPEND {}", self.append.join(" "))
    }
}

/// Global section: prompt settings, help keys and the default entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainConfig {
    /// Run timestamp embedded in the first line.
    pub timestamp: i64,
    /// Flavour booted by the `grml` label.
    pub default_flavour: String,
    /// Default, memtest and chainload entries.
    pub stanzas: Vec<Stanza>,
}

impl fmt::Display for MainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{MAIN_MARKER} [main config generated at: {}]", self.timestamp)?;
        writeln!(f, "# use this to control the bootup via a serial port")?;
        writeln!(f, "# SERIAL 0 9600")?;
        writeln!(f, "DEFAULT grml")?;
        writeln!(f, "TIMEOUT 300")?;
        writeln!(f, "PROMPT 1")?;
        writeln!(f, "DISPLAY /boot/syslinux/boot.msg")?;
        writeln!(f, "F1 /boot/syslinux/boot.msg")?;
        for screen in HELP_SCREENS {
            writeln!(f, "{} /boot/syslinux/{screen}", screen.to_ascii_uppercase())?;
        }
        writeln!(f, "## end of main configuration")?;
        writeln!(f)?;
        writeln!(f, "## global configuration")?;
        for stanza in &self.stanzas {
            write!(f, "{stanza}")?;
            writeln!(f)?;
        }
        writeln!(f, "## end of global configuration")
    }
}

/// Boot entries for one flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlavourConfig {
    /// Flavour the entries boot.
    pub flavour: String,
    /// Run timestamp embedded in the marker comments.
    pub timestamp: i64,
    /// Normal, to-RAM, debug and the other variants.
    pub stanzas: Vec<Stanza>,
}

impl fmt::Display for FlavourConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stanza in &self.stanzas {
            writeln!(f)?;
            write!(f, "{stanza}")?;
        }
        Ok(())
    }
}

fn kernel_path(flavour: &str) -> String {
    format!("/boot/release/{flavour}/linux26")
}

fn live_append(flavour: &str, extra: &[&str], boot_options: &str) -> Vec<String> {
    std::iter::once(format!("initrd=/boot/release/{flavour}/initrd.gz"))
        .chain(BASE_APPEND.iter().map(ToString::to_string))
        .chain(std::iter::once(format!("module={flavour}")))
        .chain(extra.iter().map(ToString::to_string))
        .chain(boot_options.split_whitespace().map(String::from))
        .collect()
}

fn raw_stanza(label: &str, menu_label: Option<&str>, kernel: &str, append: &str) -> Stanza {
    Stanza {
        comment: Some(label.to_string()),
        label: label.to_string(),
        menu_label: menu_label.map(String::from),
        kernel: kernel.to_string(),
        append: vec![append.to_string()],
    }
}

/// Build the global section with `params.flavour` as the default entry.
#[must_use]
pub fn main_config(params: &ConfigParams) -> MainConfig {
    let flavour = params.flavour.as_str();
    let default = Stanza {
        comment: Some(format!("the default option (using {flavour})")),
        label: "grml".to_string(),
        menu_label: None,
        kernel: kernel_path(flavour),
        append: live_append(flavour, &[], &params.boot_options),
    };
    MainConfig {
        timestamp: params.timestamp,
        default_flavour: flavour.to_string(),
        stanzas: vec![
            default,
            raw_stanza("memtest", None, "/boot/addons/memtest", "BOOT_IMAGE=memtest"),
            raw_stanza(
                "grub",
                Some("grub"),
                "/boot/addons/memdisk",
                "initrd=/boot/addons/allinone.img",
            ),
            raw_stanza(
                "dos",
                Some("dos"),
                "/boot/addons/memdisk",
                "initrd=/boot/addons/balder10.imz",
            ),
        ],
    }
}

/// Label suffix and extra kernel options of every flavour variant.
///
/// Options are stored as single tokens and joined with one space when
/// rendered: no trailing blank after `module=` when there are no boot
/// options, no double blanks, and boot options are always a separate token
/// (`initcall_debug lang=de`, never `initcall_debuglang=de`).
const VARIANTS: &[(&str, &[&str])] = &[
    ("", &[]),
    ("2ram", &["toram"]),
    ("-debug", &["debug", "boot=live", "initcall_debug"]),
    ("-x", &["startx=wm-ng"]),
    ("-nofb", &["vga=normal", "video=ofonly"]),
    (
        "-failsafe",
        &[
            "vga=normal",
            "lang=us",
            "boot=live",
            "noautoconfig",
            "atapicd",
            "noacpi",
            "acpi=off",
            "nomodules",
            "nofirewire",
            "noudev",
            "nousb",
            "nohotplug",
            "noapm",
            "nopcmcia",
            "maxcpus=1",
            "noscsi",
            "noagp",
            "nodma",
            "ide=nodma",
            "noswap",
            "nofstab",
            "nosound",
            "nogpm",
            "nosyslog",
            "nodhcp",
            "nocpu",
            "nodisc",
            "nomodem",
            "xmodule=vesa",
            "noraid",
            "nolvm",
        ],
    ),
    (
        "-forensic",
        &[
            "nofstab",
            "noraid",
            "nolvm",
            "noautoconfig",
            "noswap",
            "raid=noautodetect",
        ],
    ),
    (
        "-serial",
        &[
            "vga=normal",
            "video=vesafb:off",
            "console=tty1",
            "console=ttyS0,9600n8",
        ],
    ),
];

/// Marker comment tagging every stanza of `flavour` written at `timestamp`.
#[must_use]
pub fn flavour_marker(flavour: &str, timestamp: i64) -> String {
    format!("flavour specific configuration for {flavour} [grml2usb for {flavour}: {timestamp}]")
}

/// Build the entries for `params.flavour`.
#[must_use]
pub fn flavour_config(params: &ConfigParams) -> FlavourConfig {
    let flavour = params.flavour.as_str();
    let marker = flavour_marker(flavour, params.timestamp);
    let stanzas = VARIANTS
        .iter()
        .map(|(suffix, extra)| {
            // toram takes the flavour name as its value
            let toram = format!("toram={flavour}");
            let extra: Vec<&str> = extra
                .iter()
                .map(|opt| if *opt == "toram" { toram.as_str() } else { opt })
                .collect();
            Stanza {
                comment: Some(marker.clone()),
                label: format!("{flavour}{suffix}"),
                menu_label: None,
                kernel: kernel_path(flavour),
                append: live_append(flavour, &extra, &params.boot_options),
            }
        })
        .collect();
    FlavourConfig {
        flavour: flavour.to_string(),
        timestamp: params.timestamp,
        stanzas,
    }
}

/// Text shown by `DISPLAY` before the boot prompt.
///
/// Starts with the syslinux control codes for colour `17`, clear screen and
/// "show LSS16 image".
#[must_use]
pub fn splash_message(flavour: &str) -> String {
    format!(
        "\x0f17\x0c\x18/boot/syslinux/logo.16\n\
         \n\
         Some information and boot options available via keys F2 - F10. http://grml.org/\n\
         {flavour}\n"
    )
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::flavour::Flavour;

    fn params(flavour: &str, boot_options: &str) -> ConfigParams {
        ConfigParams {
            flavour: Flavour::from_version_line(flavour).unwrap(),
            boot_options: boot_options.to_string(),
            timestamp: 1_229_872_332,
        }
    }

    #[test]
    fn main_config_text() {
        let text = main_config(&params("grml-small", "")).to_string();
        insta::assert_snapshot!(text, @r"
        ## main syslinux configuration - generated by grml2usb [main config generated at: 1229872332]
        # use this to control the bootup via a serial port
        # SERIAL 0 9600
        DEFAULT grml
        TIMEOUT 300
        PROMPT 1
        DISPLAY /boot/syslinux/boot.msg
        F1 /boot/syslinux/boot.msg
        F2 /boot/syslinux/f2
        F3 /boot/syslinux/f3
        F4 /boot/syslinux/f4
        F5 /boot/syslinux/f5
        F6 /boot/syslinux/f6
        F7 /boot/syslinux/f7
        F8 /boot/syslinux/f8
        F9 /boot/syslinux/f9
        F10 /boot/syslinux/f10
        ## end of main configuration

        ## global configuration
        # the default option (using grml-small)
        LABEL  grml
        KERNEL /boot/release/grml-small/linux26
        APPEND initrd=/boot/release/grml-small/initrd.gz apm=power-off boot=live nomce quiet module=grml-small

        # memtest
        LABEL  memtest
        KERNEL /boot/addons/memtest
        APPEND BOOT_IMAGE=memtest

        # grub
        LABEL grub
        MENU LABEL grub
        KERNEL /boot/addons/memdisk
        APPEND initrd=/boot/addons/allinone.img

        # dos
        LABEL dos
        MENU LABEL dos
        KERNEL /boot/addons/memdisk
        APPEND initrd=/boot/addons/balder10.imz

        ## end of global configuration
        ");
    }

    #[test]
    fn flavour_config_has_eight_variants() {
        let cfg = flavour_config(&params("grml64", ""));
        let labels: Vec<&str> = cfg.stanzas.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            [
                "grml64",
                "grml642ram",
                "grml64-debug",
                "grml64-x",
                "grml64-nofb",
                "grml64-failsafe",
                "grml64-forensic",
                "grml64-serial"
            ]
        );
    }

    #[test]
    fn flavour_stanza_text() {
        let cfg = flavour_config(&params("grml-small", "ssh=secret"));
        let text = cfg.stanzas[1].to_string();
        insta::assert_snapshot!(text, @r"
        # flavour specific configuration for grml-small [grml2usb for grml-small: 1229872332]
        LABEL  grml-small2ram
        KERNEL /boot/release/grml-small/linux26
        APPEND initrd=/boot/release/grml-small/initrd.gz apm=power-off boot=live nomce quiet module=grml-small toram=grml-small ssh=secret
        ");
    }

    #[test]
    fn every_flavour_stanza_carries_the_marker() {
        let cfg = flavour_config(&params("grml", ""));
        let text = cfg.to_string();
        assert_eq!(
            text.matches("[grml2usb for grml: 1229872332]").count(),
            cfg.stanzas.len()
        );
    }

    #[test]
    fn boot_options_follow_variant_options() {
        let cfg = flavour_config(&params("grml", "lang=de  noeject"));
        let debug = &cfg.stanzas[2].append;
        assert_eq!(
            &debug[debug.len() - 3..],
            ["initcall_debug", "lang=de", "noeject"]
        );
    }

    #[test]
    fn append_lines_use_single_spaces() {
        let text = flavour_config(&params("grml", "")).to_string();
        let appends: Vec<&str> = text.lines().filter(|l| l.starts_with("APPEND ")).collect();
        assert_eq!(appends.len(), VARIANTS.len());
        for line in appends {
            assert!(!line.contains("  "), "{line}");
            assert!(!line.ends_with(' '), "{line}");
        }
        assert!(text.contains("video=vesafb:off console=tty1"));
    }

    #[test]
    fn splash_names_the_flavour() {
        let splash = splash_message("grml-medium");
        assert!(splash.starts_with("\x0f17\x0c\x18/boot/syslinux/logo.16\n\n"));
        assert!(splash.ends_with("http://grml.org/\ngrml-medium\n"));
    }
}
