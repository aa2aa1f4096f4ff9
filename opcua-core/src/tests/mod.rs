mod supported_message;
