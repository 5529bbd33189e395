mod verbindung_tests;
