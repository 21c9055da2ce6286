#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "open",
        action: "upload",
    },
];

pub(crate) const OPTIONAL_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "save",
        action: "save",
    },
    CommandSpec {
        command: "download",
        action: "save",
    },
];

pub(crate) const LANGUAGE_COMMAND: CommandSpec = CommandSpec {
    command: "lang",
    action: "set_language",
};

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "transform",
        action: "transform",
    },
    CommandSpec {
        command: "status",
        action: "status",
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

pub const STUDIO_HELP_COMMANDS: &[&str] = &[
    "/upload <path>",
    "/transform",
    "/save [path]",
    "/lang en|zh",
    "/status",
    "/help",
    "/quit",
];
