#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is a single raw value (credentials are
/// never shell-split).
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "key",
        action: "save_key",
    },
    CommandSpec {
        command: "test",
        action: "test_key",
    },
];

/// Commands taking an optional 1-based index into the current batch.
pub(crate) const INDEX_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "view",
        action: "select",
    },
    CommandSpec {
        command: "remix",
        action: "remix",
    },
    CommandSpec {
        command: "suggest",
        action: "suggest",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "close",
        action: "deselect",
    },
    CommandSpec {
        command: "list",
        action: "list",
    },
    CommandSpec {
        command: "clear_key",
        action: "clear_key",
    },
    CommandSpec {
        command: "show_key",
        action: "toggle_key_visibility",
    },
    CommandSpec {
        command: "settings",
        action: "open_settings",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const DOWNLOAD_COMMAND: CommandSpec = CommandSpec {
    command: "download",
    action: "download",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/suggest",
    "/list",
    "/view",
    "/close",
    "/remix",
    "/download",
    "/settings",
    "/key",
    "/test",
    "/clear_key",
    "/show_key",
    "/quit",
];

pub const WALLPAPER_SUGGESTIONS: &[&str] = &[
    "rainy lyrical cityscape",
    "dreamy pastel clouds",
    "cyberpunk neon Seoul at night",
    "watercolor spring flower field",
];
